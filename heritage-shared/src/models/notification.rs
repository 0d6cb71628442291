/// Per-user notifications
///
/// Notifications are written as side effects of family activity (a member
/// joins, content is published, a publication request is filed or reviewed,
/// a role changes). Fan-out helpers address every member or every admin of a
/// family, skipping the user who caused the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use super::membership::{FamilyRole, Membership};

const NOTIFICATION_COLUMNS: &str = "id, user_id, family_id, kind, message, target_id, is_read, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    InvitationAccepted,
    ContentPublished,
    PublicationRequested,
    PublicationReviewed,
    RoleChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub family_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    pub target_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// What to tell, before choosing who to tell
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub family_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
    pub target_id: Option<Uuid>,
}

impl Notification {
    /// Sends one notification to each of `recipients`, returning how many were written
    pub async fn send_to<'e, E: PgExecutor<'e>>(
        executor: E,
        recipients: &[Uuid],
        notification: &NewNotification,
    ) -> Result<u64, sqlx::Error> {
        if recipients.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, family_id, kind, message, target_id)
            SELECT recipient, $2, $3, $4, $5 FROM UNNEST($1::uuid[]) AS recipient
            "#,
        )
        .bind(recipients)
        .bind(notification.family_id)
        .bind(notification.kind)
        .bind(&notification.message)
        .bind(notification.target_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Notifies every family member holding at least `min_role`, except `actor`
    ///
    /// Takes a connection so the fan-out can join the caller's transaction.
    pub async fn notify_family(
        conn: &mut PgConnection,
        family_id: Uuid,
        min_role: FamilyRole,
        actor: Uuid,
        notification: NewNotification,
    ) -> Result<u64, sqlx::Error> {
        let recipients: Vec<Uuid> = Membership::list_user_ids(&mut *conn, family_id, min_role)
            .await?
            .into_iter()
            .filter(|id| *id != actor)
            .collect();

        let sent = Self::send_to(&mut *conn, &recipients, &notification).await?;
        tracing::debug!(%family_id, kind = ?notification.kind, sent, "Notifications sent");
        Ok(sent)
    }

    /// Notifies all members of the family
    pub async fn notify_members(
        conn: &mut PgConnection,
        family_id: Uuid,
        actor: Uuid,
        notification: NewNotification,
    ) -> Result<u64, sqlx::Error> {
        Self::notify_family(conn, family_id, FamilyRole::Reader, actor, notification).await
    }

    /// Notifies the family's admins
    pub async fn notify_admins(
        conn: &mut PgConnection,
        family_id: Uuid,
        actor: Uuid,
        notification: NewNotification,
    ) -> Result<u64, sqlx::Error> {
        Self::notify_family(conn, family_id, FamilyRole::Admin, actor, notification).await
    }

    /// Notifies a single user unless they are the actor
    pub async fn notify_user(
        conn: &mut PgConnection,
        user_id: Uuid,
        actor: Uuid,
        notification: NewNotification,
    ) -> Result<u64, sqlx::Error> {
        if user_id == actor {
            return Ok(0);
        }
        Self::send_to(conn, &[user_id], &notification).await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Marks one of the user's notifications read; `None` if it is not theirs
    pub async fn mark_read(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::InvitationAccepted).unwrap(),
            "\"invitation_accepted\""
        );
        assert_eq!(
            serde_json::to_string(&NotificationKind::PublicationReviewed).unwrap(),
            "\"publication_reviewed\""
        );
        let kind: NotificationKind = serde_json::from_str("\"role_changed\"").unwrap();
        assert_eq!(kind, NotificationKind::RoleChanged);
    }
}
