/// Family and membership endpoints
///
/// - `POST /v1/families` - create (caller becomes admin)
/// - `GET /v1/families` - the caller's families with their role
/// - `GET|PUT|DELETE /v1/families/:family_id`
/// - `GET /v1/families/:family_id/members`
/// - `PUT|DELETE /v1/families/:family_id/members/:user_id` - admin only
/// - `POST /v1/families/:family_id/leave`
///
/// A family always keeps at least one admin: demoting, removing or leaving
/// as the last admin answers 409.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{nullable, ApiPath, ValidJson},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heritage_shared::{
    auth::{
        authorization::{
            check_role, require_membership, require_permission, AuthzError, FamilyPermission,
        },
        middleware::AuthContext,
    },
    models::{
        family::{CreateFamily, Family, FamilySummary, UpdateFamily},
        membership::{FamilyRole, MemberProfile, Membership},
        notification::{NewNotification, Notification, NotificationKind},
    },
};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFamilyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFamilyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangeRoleRequest {
    pub role: FamilyRole,
}

/// A family as seen by one of its members
#[derive(Debug, Serialize)]
pub struct FamilyResponse {
    #[serde(flatten)]
    pub family: Family,
    pub role: FamilyRole,
}

/// Locks the family row and re-checks the caller's role under the lock
///
/// Admin-count checks run after this, so two admins stepping down or
/// demoting each other at once are serialized: the second one sees the
/// first one's change.
async fn lock_family(
    conn: &mut PgConnection,
    family_id: Uuid,
    actor_id: Uuid,
    permission: FamilyPermission,
) -> ApiResult<FamilyRole> {
    if !Family::lock(&mut *conn, family_id).await? {
        return Err(ApiError::not_found("Family"));
    }

    let role = Membership::find(&mut *conn, family_id, actor_id)
        .await?
        .map(|m| m.role)
        .ok_or(AuthzError::NotMember(family_id))?;
    check_role(role, permission.min_role())?;

    Ok(role)
}

async fn find_member(conn: &mut PgConnection, family_id: Uuid, user_id: Uuid) -> ApiResult<Membership> {
    Membership::find(conn, family_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))
}

/// Fails with 409 when `member_role` is the family's only admin
async fn ensure_not_last_admin(
    conn: &mut PgConnection,
    family_id: Uuid,
    member_role: FamilyRole,
) -> ApiResult<()> {
    if member_role != FamilyRole::Admin {
        return Ok(());
    }
    if Membership::count_admins(&mut *conn, family_id).await? <= 1 {
        return Err(ApiError::Conflict(
            "A family must keep at least one admin".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidJson(req): ValidJson<CreateFamilyRequest>,
) -> ApiResult<(StatusCode, Json<FamilyResponse>)> {
    let family = Family::create_with_admin(
        &state.db,
        CreateFamily {
            name: req.name.trim().to_string(),
            description: req.description,
        },
        auth.user_id,
    )
    .await?;

    tracing::info!(family_id = %family.id, user_id = %auth.user_id, "Family created");

    Ok((
        StatusCode::CREATED,
        Json(FamilyResponse {
            family,
            role: FamilyRole::Admin,
        }),
    ))
}

pub async fn list_families(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<FamilySummary>>> {
    Ok(Json(Family::list_for_user(&state.db, auth.user_id).await?))
}

pub async fn get_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
) -> ApiResult<Json<FamilyResponse>> {
    let role = require_membership(&state.db, family_id, auth.user_id).await?;

    let family = Family::find_by_id(&state.db, family_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Family"))?;

    Ok(Json(FamilyResponse { family, role }))
}

pub async fn update_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<UpdateFamilyRequest>,
) -> ApiResult<Json<FamilyResponse>> {
    let role =
        require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    let family = Family::update(
        &state.db,
        family_id,
        UpdateFamily {
            name: req.name.map(|n| n.trim().to_string()),
            description: req.description,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Family"))?;

    Ok(Json(FamilyResponse { family, role }))
}

pub async fn delete_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    if !Family::delete(&state.db, family_id).await? {
        return Err(ApiError::not_found("Family"));
    }

    tracing::info!(family_id = %family_id, user_id = %auth.user_id, "Family deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<MemberProfile>>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    Ok(Json(Membership::list_members(&state.db, family_id).await?))
}

pub async fn change_member_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, user_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<ChangeRoleRequest>,
) -> ApiResult<Json<Membership>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    let mut tx = state.db.begin().await?;

    lock_family(&mut tx, family_id, auth.user_id, FamilyPermission::Manage).await?;
    let current = find_member(&mut tx, family_id, user_id).await?;

    if current.role == req.role {
        return Ok(Json(current));
    }

    ensure_not_last_admin(&mut tx, family_id, current.role).await?;

    let updated = Membership::update_role(&mut *tx, family_id, user_id, req.role)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))?;

    Notification::notify_user(
        &mut tx,
        user_id,
        auth.user_id,
        NewNotification {
            family_id: Some(family_id),
            kind: NotificationKind::RoleChanged,
            message: format!("Your role is now {}", updated.role.as_str()),
            target_id: Some(family_id),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        family_id = %family_id,
        member_id = %user_id,
        role = updated.role.as_str(),
        "Member role changed"
    );

    Ok(Json(updated))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    let mut tx = state.db.begin().await?;

    lock_family(&mut tx, family_id, auth.user_id, FamilyPermission::Manage).await?;
    let member = find_member(&mut tx, family_id, user_id).await?;
    ensure_not_last_admin(&mut tx, family_id, member.role).await?;
    Membership::delete(&mut *tx, family_id, user_id).await?;

    tx.commit().await?;

    tracing::info!(family_id = %family_id, member_id = %user_id, "Member removed");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    require_membership(&state.db, family_id, auth.user_id).await?;

    let mut tx = state.db.begin().await?;
    let role = lock_family(&mut tx, family_id, auth.user_id, FamilyPermission::Read).await?;
    ensure_not_last_admin(&mut tx, family_id, role).await?;
    Membership::delete(&mut *tx, family_id, auth.user_id).await?;
    tx.commit().await?;

    tracing::info!(family_id = %family_id, user_id = %auth.user_id, "Member left family");

    Ok(StatusCode::NO_CONTENT)
}
