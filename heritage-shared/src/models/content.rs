/// Cultural content: tales, crafts, proverbs and riddles
///
/// Every item shares the common columns of `contents`; the kind-specific
/// fields live in the `details` JSONB column as a [`ContentDetails`] document
/// tagged by `kind`, which must agree with `content_type`.
///
/// # Lifecycle
///
/// ```text
///            publish               archive
///   DRAFT ───────────▶ PUBLISHED ───────────▶ ARCHIVED
///     │  ▲                                       │
///     │  └─────────────── restore ───────────────┘
///     └──────────────────── archive ─────────────▶
/// ```
///
/// # Example
///
/// ```
/// use heritage_shared::models::content::{ContentDetails, ContentStatus, ContentType};
///
/// let details = ContentDetails::Proverb {
///     meaning: Some("Patience brings results".into()),
///     usage: None,
/// };
/// assert!(details.matches_type(ContentType::Proverb));
/// assert!(ContentStatus::Draft.can_transition_to(ContentStatus::Published));
/// assert!(!ContentStatus::Archived.can_transition_to(ContentStatus::Published));
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

const CONTENT_COLUMNS: &str = "id, family_id, category_id, author_id, content_type, title, body, \
                               language, region, details, status, created_at, updated_at, published_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Tale,
    Craft,
    Proverb,
    Riddle,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Tale => "tale",
            ContentType::Craft => "craft",
            ContentType::Proverb => "proverb",
            ContentType::Riddle => "riddle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Published,
    Archived,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Archived => "archived",
        }
    }

    pub fn can_transition_to(&self, next: ContentStatus) -> bool {
        matches!(
            (self, next),
            (ContentStatus::Draft, ContentStatus::Published)
                | (ContentStatus::Draft, ContentStatus::Archived)
                | (ContentStatus::Published, ContentStatus::Archived)
                | (ContentStatus::Archived, ContentStatus::Draft)
        )
    }
}

/// Kind-specific fields, tagged with the content kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentDetails {
    Tale {
        #[serde(default)]
        moral: Option<String>,
        #[serde(default)]
        origin: Option<String>,
    },
    Craft {
        #[serde(default)]
        materials: Vec<String>,
        #[serde(default)]
        steps: Vec<String>,
    },
    Proverb {
        #[serde(default)]
        meaning: Option<String>,
        #[serde(default)]
        usage: Option<String>,
    },
    Riddle {
        #[serde(default)]
        answer: Option<String>,
        #[serde(default)]
        hint: Option<String>,
    },
}

impl ContentDetails {
    /// Details with every field empty
    pub fn empty_for(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Tale => ContentDetails::Tale { moral: None, origin: None },
            ContentType::Craft => ContentDetails::Craft { materials: Vec::new(), steps: Vec::new() },
            ContentType::Proverb => ContentDetails::Proverb { meaning: None, usage: None },
            ContentType::Riddle => ContentDetails::Riddle { answer: None, hint: None },
        }
    }

    pub fn kind(&self) -> ContentType {
        match self {
            ContentDetails::Tale { .. } => ContentType::Tale,
            ContentDetails::Craft { .. } => ContentType::Craft,
            ContentDetails::Proverb { .. } => ContentType::Proverb,
            ContentDetails::Riddle { .. } => ContentType::Riddle,
        }
    }

    pub fn matches_type(&self, content_type: ContentType) -> bool {
        self.kind() == content_type
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Content {
    pub id: Uuid,
    pub family_id: Uuid,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub content_type: ContentType,
    pub title: String,
    pub body: String,
    pub language: Option<String>,
    pub region: Option<String>,
    pub details: Json<ContentDetails>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Content {
    pub fn is_author(&self, user_id: Uuid) -> bool {
        self.author_id == Some(user_id)
    }
}

#[derive(Debug, Clone)]
pub struct CreateContent {
    pub family_id: Uuid,
    pub author_id: Uuid,
    pub category_id: Option<Uuid>,
    pub content_type: ContentType,
    pub title: String,
    pub body: String,
    pub language: Option<String>,
    pub region: Option<String>,
    pub details: ContentDetails,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateContent {
    pub title: Option<String>,
    pub body: Option<String>,
    pub language: Option<Option<String>>,
    pub region: Option<Option<String>>,
    pub category_id: Option<Option<Uuid>>,
    pub details: Option<ContentDetails>,
}

/// Listing filters; `None` fields do not filter
#[derive(Debug, Clone)]
pub struct ContentFilter {
    pub content_type: Option<ContentType>,
    pub status: Option<ContentStatus>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self {
            content_type: None,
            status: None,
            category_id: None,
            search: None,
            limit: 20,
            offset: 0,
        }
    }
}

/// `ILIKE` pattern matching `term` anywhere, with wildcards escaped
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const FILTER_CLAUSE: &str = r#"
    WHERE family_id = $1
      AND ($2::content_type IS NULL OR content_type = $2)
      AND ($3::content_status IS NULL OR status = $3)
      AND ($4::uuid IS NULL OR category_id = $4)
      AND ($5::text IS NULL OR title ILIKE $5)
"#;

impl Content {
    pub async fn create(pool: &PgPool, data: CreateContent) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Content>(&format!(
            r#"
            INSERT INTO contents
                (family_id, author_id, category_id, content_type, title, body, language, region, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(data.family_id)
        .bind(data.author_id)
        .bind(data.category_id)
        .bind(data.content_type)
        .bind(data.title.trim())
        .bind(data.body)
        .bind(data.language)
        .bind(data.region)
        .bind(Json(data.details))
        .fetch_one(pool)
        .await
    }

    pub async fn find_in_family(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Content>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE id = $1 AND family_id = $2"
        ))
        .bind(id)
        .bind(family_id)
        .fetch_optional(pool)
        .await
    }

    /// Filtered page, most recently updated first
    pub async fn list(
        pool: &PgPool,
        family_id: Uuid,
        filter: &ContentFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Content>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents {FILTER_CLAUSE} \
             ORDER BY updated_at DESC, id ASC LIMIT $6 OFFSET $7"
        ))
        .bind(family_id)
        .bind(filter.content_type)
        .bind(filter.status)
        .bind(filter.category_id)
        .bind(filter.search.as_deref().map(contains_pattern))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(pool)
        .await
    }

    /// Total matching `filter`, ignoring pagination
    pub async fn count(
        pool: &PgPool,
        family_id: Uuid,
        filter: &ContentFilter,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM contents {FILTER_CLAUSE}"))
            .bind(family_id)
            .bind(filter.content_type)
            .bind(filter.status)
            .bind(filter.category_id)
            .bind(filter.search.as_deref().map(contains_pattern))
            .fetch_one(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
        data: UpdateContent,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE contents SET updated_at = NOW()");
        let mut bind_count = 2;

        let mut push = |column: &str, present: bool| {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {} = ${}", column, bind_count));
            }
        };
        push("title", data.title.is_some());
        push("body", data.body.is_some());
        push("language", data.language.is_some());
        push("region", data.region.is_some());
        push("category_id", data.category_id.is_some());
        push("details", data.details.is_some());

        query.push_str(&format!(" WHERE id = $1 AND family_id = $2 RETURNING {CONTENT_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Content>(&query).bind(id).bind(family_id);
        if let Some(title) = data.title {
            q = q.bind(title.trim().to_string());
        }
        if let Some(body) = data.body {
            q = q.bind(body);
        }
        if let Some(language) = data.language {
            q = q.bind(language);
        }
        if let Some(region) = data.region {
            q = q.bind(region);
        }
        if let Some(category_id) = data.category_id {
            q = q.bind(category_id);
        }
        if let Some(details) = data.details {
            q = q.bind(Json(details));
        }

        q.fetch_optional(pool).await
    }

    /// Moves `from` to `to`; `None` if the row changed status concurrently
    ///
    /// Publishing stamps `published_at`.
    pub async fn transition<'e, E: sqlx::PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        from: ContentStatus,
        to: ContentStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Content>(&format!(
            r#"
            UPDATE contents
            SET status = $3,
                updated_at = NOW(),
                published_at = CASE WHEN $3 = 'published'::content_status THEN NOW() ELSE published_at END
            WHERE id = $1 AND status = $2
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete(pool: &PgPool, family_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contents WHERE id = $1 AND family_id = $2")
            .bind(id)
            .bind(family_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_allowed_transitions() {
        use ContentStatus::*;

        assert!(Draft.can_transition_to(Published));
        assert!(Draft.can_transition_to(Archived));
        assert!(Published.can_transition_to(Archived));
        assert!(Archived.can_transition_to(Draft));
    }

    #[test]
    fn test_forbidden_transitions() {
        use ContentStatus::*;

        assert!(!Published.can_transition_to(Draft));
        assert!(!Archived.can_transition_to(Published));
        for status in [Draft, Published, Archived] {
            assert!(!status.can_transition_to(status), "{:?} -> itself", status);
        }
    }

    #[test]
    fn test_details_tagged_by_kind() {
        let details: ContentDetails = serde_json::from_value(json!({
            "kind": "craft",
            "materials": ["bamboo", "rattan"],
            "steps": ["split", "weave"]
        }))
        .unwrap();

        assert_eq!(details.kind(), ContentType::Craft);
        assert!(details.matches_type(ContentType::Craft));
        assert!(!details.matches_type(ContentType::Tale));

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["kind"], "craft");
        assert_eq!(value["materials"][1], "rattan");
    }

    #[test]
    fn test_details_fields_default_when_missing() {
        let details: ContentDetails = serde_json::from_value(json!({ "kind": "riddle" })).unwrap();
        assert_eq!(details, ContentDetails::empty_for(ContentType::Riddle));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(serde_json::from_value::<ContentDetails>(json!({ "kind": "poem" })).is_err());
        assert!(serde_json::from_value::<ContentDetails>(json!({ "moral": "x" })).is_err());
    }

    #[test]
    fn test_empty_for_matches_every_type() {
        for ty in [ContentType::Tale, ContentType::Craft, ContentType::Proverb, ContentType::Riddle] {
            assert!(ContentDetails::empty_for(ty).matches_type(ty));
        }
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("rice"), "%rice%");
        assert_eq!(contains_pattern(" 100% _true_ "), "%100\\% \\_true\\_%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_filter_defaults() {
        let filter = ContentFilter::default();
        assert_eq!(filter.limit, 20);
        assert_eq!(filter.offset, 0);
        assert!(filter.status.is_none());
    }
}
