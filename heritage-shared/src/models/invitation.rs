/// Invitation model: code-based, time-limited, single-use family invitations
///
/// # Schema
///
/// ```sql
/// CREATE TYPE invitation_status AS ENUM ('pending', 'accepted', 'expired');
///
/// CREATE TABLE invitations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     family_id UUID NOT NULL REFERENCES families(id) ON DELETE CASCADE,
///     code VARCHAR(32) NOT NULL,
///     role family_role NOT NULL DEFAULT 'reader',
///     email VARCHAR(255),
///     status invitation_status NOT NULL DEFAULT 'pending',
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     accepted_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     expires_at TIMESTAMPTZ NOT NULL,
///     accepted_at TIMESTAMPTZ,
///     CONSTRAINT invitations_code_key UNIQUE (code)
/// );
/// ```
///
/// # Redemption
///
/// [`Invitation::redeem`] locks the invitation row, checks it can still be
/// used, then flips it to `accepted` with a conditional update and inserts
/// the membership in the same transaction. A concurrent redemption of the
/// same code fails with [`RedeemError::AlreadyAccepted`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::membership::{FamilyRole, Membership};
use super::user::normalize_email;
use crate::auth::invitation_code;

/// Attempts at drawing a code not already taken
const MAX_CODE_ATTEMPTS: usize = 5;

const INVITATION_COLUMNS: &str = "id, family_id, code, role, email, status, created_by, \
                                  accepted_by, created_at, expires_at, accepted_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub family_id: Uuid,
    pub code: String,
    pub role: FamilyRole,

    /// Restricts redemption to this address when set
    pub email: Option<String>,

    pub status: InvitationStatus,
    pub created_by: Option<Uuid>,
    pub accepted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub family_id: Uuid,
    pub role: FamilyRole,
    pub email: Option<String>,
    pub valid_for: Duration,
    pub created_by: Uuid,
}

/// Reasons a code cannot be redeemed
#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error("Invitation not found")]
    NotFound,

    #[error("Invitation has already been used")]
    AlreadyAccepted,

    #[error("Invitation has expired")]
    Expired,

    #[error("Invitation was issued for a different email address")]
    EmailMismatch,

    #[error("Already a member of this family")]
    AlreadyMember,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn is_code_collision(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.constraint())
        .map_or(false, |c| c == "invitations_code_key")
}

impl Invitation {
    /// Whether the invitation is past its expiry or marked expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            InvitationStatus::Expired => true,
            InvitationStatus::Pending => self.expires_at <= now,
            InvitationStatus::Accepted => false,
        }
    }

    /// First reason `caller_email` may not redeem this invitation at `now`
    pub fn redeem_blocker(&self, now: DateTime<Utc>, caller_email: &str) -> Option<RedeemError> {
        if self.status == InvitationStatus::Accepted {
            return Some(RedeemError::AlreadyAccepted);
        }
        if self.is_expired_at(now) {
            return Some(RedeemError::Expired);
        }
        match &self.email {
            Some(invitee) if normalize_email(invitee) != normalize_email(caller_email) => {
                Some(RedeemError::EmailMismatch)
            }
            _ => None,
        }
    }

    /// Creates a pending invitation with a fresh unique code
    pub async fn create(pool: &PgPool, data: CreateInvitation) -> Result<Self, sqlx::Error> {
        let expires_at = Utc::now() + data.valid_for;
        let email = data.email.as_deref().map(normalize_email);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let code = invitation_code::generate_code();

            let result = sqlx::query_as::<_, Invitation>(&format!(
                r#"
                INSERT INTO invitations (family_id, code, role, email, created_by, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {INVITATION_COLUMNS}
                "#
            ))
            .bind(data.family_id)
            .bind(&code)
            .bind(data.role)
            .bind(&email)
            .bind(data.created_by)
            .bind(expires_at)
            .fetch_one(pool)
            .await;

            match result {
                Err(e) if is_code_collision(&e) && attempt < MAX_CODE_ATTEMPTS => {
                    tracing::warn!(attempt, "Invitation code collision, retrying");
                }
                other => return other,
            }
        }
    }

    pub async fn find_in_family(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1 AND family_id = $2"
        ))
        .bind(id)
        .bind(family_id)
        .fetch_optional(pool)
        .await
    }

    /// Family invitations, newest first
    pub async fn list_by_family(
        pool: &PgPool,
        family_id: Uuid,
        status: Option<InvitationStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS}
            FROM invitations
            WHERE family_id = $1 AND ($2::invitation_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(family_id)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Deletes a pending invitation; accepted or expired ones are kept
    pub async fn revoke(pool: &PgPool, family_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM invitations WHERE id = $1 AND family_id = $2 AND status = 'pending'",
        )
        .bind(id)
        .bind(family_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Redeems `code` for the caller and returns the accepted invitation
    pub async fn redeem(
        pool: &PgPool,
        code: &str,
        user_id: Uuid,
        user_email: &str,
    ) -> Result<Self, RedeemError> {
        let code = invitation_code::normalize(code);
        if !invitation_code::is_valid_format(&code) {
            return Err(RedeemError::NotFound);
        }

        let mut tx = pool.begin().await?;

        let invitation = sqlx::query_as::<_, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE code = $1 FOR UPDATE"
        ))
        .bind(&code)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RedeemError::NotFound)?;

        if let Some(blocker) = invitation.redeem_blocker(Utc::now(), user_email) {
            if matches!(blocker, RedeemError::Expired)
                && invitation.status == InvitationStatus::Pending
            {
                sqlx::query("UPDATE invitations SET status = 'expired' WHERE id = $1")
                    .bind(invitation.id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
            return Err(blocker);
        }

        if Membership::find(&mut *tx, invitation.family_id, user_id)
            .await?
            .is_some()
        {
            return Err(RedeemError::AlreadyMember);
        }

        let accepted = sqlx::query_as::<_, Invitation>(&format!(
            r#"
            UPDATE invitations
            SET status = 'accepted', accepted_by = $2, accepted_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(invitation.id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RedeemError::AlreadyAccepted)?;

        Membership::create(&mut *tx, accepted.family_id, user_id, accepted.role).await?;

        tx.commit().await?;

        tracing::info!(
            invitation_id = %accepted.id,
            family_id = %accepted.family_id,
            user_id = %user_id,
            role = accepted.role.as_str(),
            "Invitation redeemed"
        );

        Ok(accepted)
    }

    /// Marks pending invitations past their expiry as expired
    pub async fn expire_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'expired' WHERE status = 'pending' AND expires_at <= NOW()",
        )
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation(status: InvitationStatus, expires_in: Duration, email: Option<&str>) -> Invitation {
        let now = Utc::now();
        Invitation {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            code: "ABCD-EFGH-JKMN".to_string(),
            role: FamilyRole::Reader,
            email: email.map(str::to_string),
            status,
            created_by: None,
            accepted_by: None,
            created_at: now,
            expires_at: now + expires_in,
            accepted_at: None,
        }
    }

    #[test]
    fn test_pending_invitation_is_redeemable() {
        let inv = invitation(InvitationStatus::Pending, Duration::hours(1), None);
        assert!(inv.redeem_blocker(Utc::now(), "anyone@example.com").is_none());
    }

    #[test]
    fn test_accepted_invitation_blocked() {
        let inv = invitation(InvitationStatus::Accepted, Duration::hours(1), None);
        assert!(matches!(
            inv.redeem_blocker(Utc::now(), "a@example.com"),
            Some(RedeemError::AlreadyAccepted)
        ));
    }

    #[test]
    fn test_pending_past_expiry_counts_as_expired() {
        let inv = invitation(InvitationStatus::Pending, Duration::hours(-1), None);
        assert!(inv.is_expired_at(Utc::now()));
        assert!(matches!(
            inv.redeem_blocker(Utc::now(), "a@example.com"),
            Some(RedeemError::Expired)
        ));
    }

    #[test]
    fn test_marked_expired_is_blocked_even_before_deadline() {
        let inv = invitation(InvitationStatus::Expired, Duration::hours(5), None);
        assert!(matches!(
            inv.redeem_blocker(Utc::now(), "a@example.com"),
            Some(RedeemError::Expired)
        ));
    }

    #[test]
    fn test_email_restriction() {
        let inv = invitation(InvitationStatus::Pending, Duration::hours(1), Some("cousin@example.com"));

        assert!(inv.redeem_blocker(Utc::now(), " Cousin@Example.com").is_none());
        assert!(matches!(
            inv.redeem_blocker(Utc::now(), "stranger@example.com"),
            Some(RedeemError::EmailMismatch)
        ));
    }

    #[test]
    fn test_accepted_takes_precedence_over_expiry() {
        let inv = invitation(InvitationStatus::Accepted, Duration::hours(-1), Some("x@example.com"));
        assert!(matches!(
            inv.redeem_blocker(Utc::now(), "y@example.com"),
            Some(RedeemError::AlreadyAccepted)
        ));
    }
}
