/// Family membership model with role-based access
///
/// # Schema
///
/// ```sql
/// CREATE TYPE family_role AS ENUM ('admin', 'editor', 'reader');
///
/// CREATE TABLE family_memberships (
///     family_id UUID NOT NULL REFERENCES families(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role family_role NOT NULL DEFAULT 'reader',
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (family_id, user_id)
/// );
/// ```
///
/// # Roles
///
/// - **admin**: manages the family, members, invitations, publishes content
/// - **editor**: writes content, quizzes, categories and genealogy
/// - **reader**: reads published content and takes quizzes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Permission tier within a family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "family_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FamilyRole {
    Admin,
    Editor,
    Reader,
}

impl FamilyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyRole::Admin => "admin",
            FamilyRole::Editor => "editor",
            FamilyRole::Reader => "reader",
        }
    }

    /// Hierarchy: Admin > Editor > Reader
    pub fn has_permission(&self, required: FamilyRole) -> bool {
        self.level() >= required.level()
    }

    fn level(&self) -> u8 {
        match self {
            FamilyRole::Admin => 3,
            FamilyRole::Editor => 2,
            FamilyRole::Reader => 1,
        }
    }

    pub fn can_manage_members(&self) -> bool {
        matches!(self, FamilyRole::Admin)
    }

    pub fn can_publish(&self) -> bool {
        matches!(self, FamilyRole::Admin)
    }

    pub fn can_write_content(&self) -> bool {
        !matches!(self, FamilyRole::Reader)
    }

    /// Drafts and archived content are hidden from readers
    pub fn can_view_unpublished(&self) -> bool {
        self.can_write_content()
    }
}

impl Default for FamilyRole {
    fn default() -> Self {
        FamilyRole::Reader
    }
}

/// A user's membership in a family
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub family_id: Uuid,
    pub user_id: Uuid,
    pub role: FamilyRole,
    pub joined_at: DateTime<Utc>,
}

/// Membership joined with the member's public profile
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MemberProfile {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: FamilyRole,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    /// Adds a user to a family; usable inside a transaction
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        user_id: Uuid,
        role: FamilyRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO family_memberships (family_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING family_id, user_id, role, joined_at
            "#,
        )
        .bind(family_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(executor)
        .await
    }

    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT family_id, user_id, role, joined_at
            FROM family_memberships
            WHERE family_id = $1 AND user_id = $2
            "#,
        )
        .bind(family_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// The user's role, or `None` when not a member
    pub async fn get_role(
        pool: &PgPool,
        family_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<FamilyRole>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT role FROM family_memberships WHERE family_id = $1 AND user_id = $2",
        )
        .bind(family_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_role<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        user_id: Uuid,
        role: FamilyRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE family_memberships
            SET role = $3
            WHERE family_id = $1 AND user_id = $2
            RETURNING family_id, user_id, role, joined_at
            "#,
        )
        .bind(family_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM family_memberships WHERE family_id = $1 AND user_id = $2")
                .bind(family_id)
                .bind(user_id)
                .execute(executor)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Members with profile data, admins first
    pub async fn list_members(
        pool: &PgPool,
        family_id: Uuid,
    ) -> Result<Vec<MemberProfile>, sqlx::Error> {
        sqlx::query_as::<_, MemberProfile>(
            r#"
            SELECT u.id AS user_id, u.email, u.display_name, u.avatar_url, m.role, m.joined_at
            FROM family_memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.family_id = $1
            ORDER BY m.role ASC, m.joined_at ASC
            "#,
        )
        .bind(family_id)
        .fetch_all(pool)
        .await
    }

    /// IDs of members holding at least `min_role`
    pub async fn list_user_ids<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        min_role: FamilyRole,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid, FamilyRole)> =
            sqlx::query_as("SELECT user_id, role FROM family_memberships WHERE family_id = $1")
                .bind(family_id)
                .fetch_all(executor)
                .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, role)| role.has_permission(min_role))
            .map(|(user_id, _)| user_id)
            .collect())
    }

    /// Number of admins; guards against orphaning a family
    pub async fn count_admins<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM family_memberships WHERE family_id = $1 AND role = 'admin'",
        )
        .bind(family_id)
        .fetch_one(executor)
        .await
    }
}
