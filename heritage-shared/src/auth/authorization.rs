/// Family-scoped authorization checks
///
/// # Permission Model
///
/// 1. **Family Membership**: the caller must belong to the family named in the path
/// 2. **Role-Based Permissions**: [`FamilyRole`] hierarchy, Admin > Editor > Reader
/// 3. **Authorship**: authors may edit their own resources without the elevated role
///
/// Roles are read from the database on every request, never from the token.
///
/// # Example
///
/// ```no_run
/// use heritage_shared::auth::authorization::{require_permission, FamilyPermission};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// async fn check(pool: &PgPool, family_id: Uuid, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
///     let role = require_permission(pool, family_id, user_id, FamilyPermission::Write).await?;
///     println!("caller is {}", role.as_str());
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::membership::{FamilyRole, Membership};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Not a member of family {0}")]
    NotMember(Uuid),

    #[error("Insufficient permissions: requires {}, has {}", required.as_str(), actual.as_str())]
    InsufficientRole {
        required: FamilyRole,
        actual: FamilyRole,
    },

    /// Caller is neither the author nor sufficiently privileged
    #[error("Not authorized to modify this resource")]
    NotAuthorized,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Kinds of access a family-scoped operation needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyPermission {
    /// Reader+
    Read,
    /// Editor+
    Write,
    /// Admin only
    Manage,
}

impl FamilyPermission {
    pub fn min_role(&self) -> FamilyRole {
        match self {
            FamilyPermission::Read => FamilyRole::Reader,
            FamilyPermission::Write => FamilyRole::Editor,
            FamilyPermission::Manage => FamilyRole::Admin,
        }
    }
}

/// Checks membership and returns the caller's role
pub async fn require_membership(
    pool: &PgPool,
    family_id: Uuid,
    user_id: Uuid,
) -> Result<FamilyRole, AuthzError> {
    Membership::get_role(pool, family_id, user_id)
        .await?
        .ok_or(AuthzError::NotMember(family_id))
}

/// Checks the caller holds at least `required`, returning the actual role
pub async fn require_role(
    pool: &PgPool,
    family_id: Uuid,
    user_id: Uuid,
    required: FamilyRole,
) -> Result<FamilyRole, AuthzError> {
    let actual = require_membership(pool, family_id, user_id).await?;
    check_role(actual, required)?;
    Ok(actual)
}

pub async fn require_permission(
    pool: &PgPool,
    family_id: Uuid,
    user_id: Uuid,
    permission: FamilyPermission,
) -> Result<FamilyRole, AuthzError> {
    require_role(pool, family_id, user_id, permission.min_role()).await
}

/// Pure role comparison
pub fn check_role(actual: FamilyRole, required: FamilyRole) -> Result<(), AuthzError> {
    if !actual.has_permission(required) {
        return Err(AuthzError::InsufficientRole { required, actual });
    }
    Ok(())
}

/// Allows the resource's author, or anyone holding `override_role`
pub fn check_author_or_role(
    actual: FamilyRole,
    user_id: Uuid,
    author_id: Uuid,
    override_role: FamilyRole,
) -> Result<(), AuthzError> {
    if user_id == author_id || actual.has_permission(override_role) {
        Ok(())
    } else {
        Err(AuthzError::NotAuthorized)
    }
}

/// Membership check followed by [`check_author_or_role`]
pub async fn require_author_or_role(
    pool: &PgPool,
    family_id: Uuid,
    user_id: Uuid,
    author_id: Uuid,
    override_role: FamilyRole,
) -> Result<FamilyRole, AuthzError> {
    let actual = require_membership(pool, family_id, user_id).await?;
    check_author_or_role(actual, user_id, author_id, override_role)?;
    Ok(actual)
}
