/// Per-family content categories
///
/// Names are unique within a family (`categories_family_name_key`). Deleting a
/// category keeps its content, with `category_id` reset to NULL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Category with the number of content items filed under it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryWithCount {
    pub id: Uuid,
    pub family_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub content_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

impl Category {
    pub async fn create(
        pool: &PgPool,
        family_id: Uuid,
        name: &str,
        description: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (family_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, family_id, name, description, created_at
            "#,
        )
        .bind(family_id)
        .bind(name.trim())
        .bind(description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_in_family(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, family_id, name, description, created_at
            FROM categories
            WHERE id = $1 AND family_id = $2
            "#,
        )
        .bind(id)
        .bind(family_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_family(
        pool: &PgPool,
        family_id: Uuid,
    ) -> Result<Vec<CategoryWithCount>, sqlx::Error> {
        sqlx::query_as::<_, CategoryWithCount>(
            r#"
            SELECT c.id, c.family_id, c.name, c.description, c.created_at,
                   COUNT(ct.id) AS content_count
            FROM categories c
            LEFT JOIN contents ct ON ct.category_id = c.id
            WHERE c.family_id = $1
            GROUP BY c.id
            ORDER BY c.name ASC
            "#,
        )
        .bind(family_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
        data: UpdateCategory,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET name = COALESCE($3, name),
                description = CASE WHEN $4 THEN $5 ELSE description END
            WHERE id = $1 AND family_id = $2
            RETURNING id, family_id, name, description, created_at
            "#,
        )
        .bind(id)
        .bind(family_id)
        .bind(data.name.map(|n| n.trim().to_string()))
        .bind(data.description.is_some())
        .bind(data.description.flatten())
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, family_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1 AND family_id = $2")
            .bind(id)
            .bind(family_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
