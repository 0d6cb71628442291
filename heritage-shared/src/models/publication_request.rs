/// Requests from editors asking an admin to publish a draft
///
/// At most one request per content item may be pending, enforced by the
/// partial unique index `publication_requests_one_pending_per_content`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const REQUEST_COLUMNS: &str = "id, family_id, content_id, requested_by, message, status, \
                               reviewed_by, review_comment, created_at, reviewed_at";

/// Name of the index guarding against duplicate pending requests
pub const ONE_PENDING_CONSTRAINT: &str = "publication_requests_one_pending_per_content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "publication_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Admin verdict on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn resulting_status(&self) -> PublicationStatus {
        match self {
            ReviewDecision::Approve => PublicationStatus::Approved,
            ReviewDecision::Reject => PublicationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicationRequest {
    pub id: Uuid,
    pub family_id: Uuid,
    pub content_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub message: Option<String>,
    pub status: PublicationStatus,
    pub reviewed_by: Option<Uuid>,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl PublicationRequest {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        content_id: Uuid,
        requested_by: Uuid,
        message: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PublicationRequest>(&format!(
            r#"
            INSERT INTO publication_requests (family_id, content_id, requested_by, message)
            VALUES ($1, $2, $3, $4)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(family_id)
        .bind(content_id)
        .bind(requested_by)
        .bind(message)
        .fetch_one(executor)
        .await
    }

    /// Locks the request row when run inside a transaction
    pub async fn find_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PublicationRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM publication_requests \
             WHERE id = $1 AND family_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(family_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_by_family(
        pool: &PgPool,
        family_id: Uuid,
        status: Option<PublicationStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PublicationRequest>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM publication_requests
            WHERE family_id = $1 AND ($2::publication_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(family_id)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Records the verdict on a still-pending request
    pub async fn record_review<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        reviewer_id: Uuid,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PublicationRequest>(&format!(
            r#"
            UPDATE publication_requests
            SET status = $2, reviewed_by = $3, review_comment = $4, reviewed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(decision.resulting_status())
        .bind(reviewer_id)
        .bind(comment)
        .fetch_optional(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_status() {
        assert_eq!(ReviewDecision::Approve.resulting_status(), PublicationStatus::Approved);
        assert_eq!(ReviewDecision::Reject.resulting_status(), PublicationStatus::Rejected);
    }

    #[test]
    fn test_decision_serde() {
        let decision: ReviewDecision = serde_json::from_str("\"approve\"").unwrap();
        assert_eq!(decision, ReviewDecision::Approve);
        assert!(serde_json::from_str::<ReviewDecision>("\"maybe\"").is_err());
    }
}
