/// Family model and database operations
///
/// A family is the unit of isolation: every category, content item, quiz,
/// genealogy tree and invitation belongs to exactly one family, and all
/// access goes through [`Membership`](super::membership::Membership).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE families (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(150) NOT NULL,
///     description TEXT,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use heritage_shared::models::family::{CreateFamily, Family};
/// # use sqlx::{PgExecutor, PgPool};
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
/// // The creator becomes the family's first admin
/// let family = Family::create_with_admin(&pool, CreateFamily {
///     name: "The Nguyens".to_string(),
///     description: None,
/// }, user_id).await?;
///
/// let mine = Family::list_for_user(&pool, user_id).await?;
/// assert!(mine.iter().any(|f| f.id == family.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::membership::{FamilyRole, Membership};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Family {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A family as seen by one of its members
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FamilySummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub role: FamilyRole,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateFamily {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateFamily {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
}

impl Family {
    /// Creates the family and its first admin membership atomically
    pub async fn create_with_admin(
        pool: &PgPool,
        data: CreateFamily,
        creator_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let family = sqlx::query_as::<_, Family>(
            r#"
            INSERT INTO families (name, description, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, created_by, created_at, updated_at
            "#,
        )
        .bind(data.name.trim())
        .bind(data.description)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await?;

        Membership::create(&mut *tx, family.id, creator_id, FamilyRole::Admin).await?;

        tx.commit().await?;

        tracing::info!(family_id = %family.id, creator_id = %creator_id, "Family created");

        Ok(family)
    }

    /// Row-locks the family for the rest of the transaction
    ///
    /// Membership changes that must keep an admin take this lock first, so
    /// concurrent demotions and departures run one after another. Returns
    /// `false` when the family does not exist.
    pub async fn lock<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM families WHERE id = $1 FOR NO KEY UPDATE")
                .bind(id)
                .fetch_optional(executor)
                .await?;

        Ok(locked.is_some())
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Family>(
            r#"
            SELECT id, name, description, created_by, created_at, updated_at
            FROM families
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Families the user belongs to, with the user's role in each
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<FamilySummary>, sqlx::Error> {
        sqlx::query_as::<_, FamilySummary>(
            r#"
            SELECT f.id, f.name, f.description, m.role, f.created_at,
                   (SELECT COUNT(*) FROM family_memberships c WHERE c.family_id = f.id) AS member_count
            FROM families f
            JOIN family_memberships m ON m.family_id = f.id
            WHERE m.user_id = $1
            ORDER BY f.name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateFamily,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE families SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }

        query.push_str(
            " WHERE id = $1 RETURNING id, name, description, created_by, created_at, updated_at",
        );

        let mut q = sqlx::query_as::<_, Family>(&query).bind(id);
        if let Some(name) = data.name {
            q = q.bind(name.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes the family; owned rows go with it through cascades
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM families WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
