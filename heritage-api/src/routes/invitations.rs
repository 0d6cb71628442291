/// Invitation endpoints
///
/// - `POST /v1/families/:family_id/invitations` - admin creates a code
/// - `GET /v1/families/:family_id/invitations[?status=pending]` - admin lists
/// - `DELETE /v1/families/:family_id/invitations/:invitation_id` - admin
///   revokes a pending invitation
/// - `POST /v1/invitations/redeem` - any authenticated user joins by code
///
/// Codes are single use. Redemption runs in one transaction; see
/// [`Invitation::redeem`] for the checks and their order.

use crate::{
    app::AppState,
    config::MAX_INVITATION_TTL_HOURS,
    error::{ApiError, ApiResult},
    extract::{ApiPath, ApiQuery, ValidJson},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Duration;
use heritage_shared::{
    auth::{
        authorization::{require_permission, FamilyPermission},
        middleware::AuthContext,
    },
    models::{
        invitation::{CreateInvitation, Invitation, InvitationStatus},
        membership::FamilyRole,
        notification::{NewNotification, Notification, NotificationKind},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    /// Role granted on redemption; reader when omitted
    #[serde(default)]
    pub role: FamilyRole,

    /// Only this address may redeem the code
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: Option<String>,

    /// Validity in hours; the server default when omitted
    #[validate(range(min = 1, max = 720, message = "Validity must be 1-720 hours"))]
    pub valid_for_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InvitationListQuery {
    pub status: Option<InvitationStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemRequest {
    #[validate(length(min = 1, max = 32, message = "Code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub family_id: Uuid,
    pub role: FamilyRole,
    pub invitation: Invitation,
}

pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<CreateInvitationRequest>,
) -> ApiResult<(StatusCode, Json<Invitation>)> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    let hours = req
        .valid_for_hours
        .unwrap_or(state.config.invitations.default_ttl_hours)
        .clamp(1, MAX_INVITATION_TTL_HOURS);

    let invitation = Invitation::create(
        &state.db,
        CreateInvitation {
            family_id,
            role: req.role,
            email: req.email,
            valid_for: Duration::hours(hours),
            created_by: auth.user_id,
        },
    )
    .await?;

    tracing::info!(
        family_id = %family_id,
        invitation_id = %invitation.id,
        role = invitation.role.as_str(),
        valid_for_hours = hours,
        "Invitation created"
    );

    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<InvitationListQuery>,
) -> ApiResult<Json<Vec<Invitation>>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    Ok(Json(
        Invitation::list_by_family(&state.db, family_id, query.status).await?,
    ))
}

pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, invitation_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    if Invitation::revoke(&state.db, family_id, invitation_id).await? {
        return Ok(StatusCode::NO_CONTENT);
    }

    // Distinguish a spent invitation from a missing one
    match Invitation::find_in_family(&state.db, family_id, invitation_id).await? {
        Some(_) => Err(ApiError::Conflict(
            "Only pending invitations can be revoked".to_string(),
        )),
        None => Err(ApiError::not_found("Invitation")),
    }
}

async fn notify_joined(
    state: &AppState,
    invitation: &Invitation,
    auth: &AuthContext,
) -> Result<u64, sqlx::Error> {
    let mut conn = state.db.acquire().await?;
    Notification::notify_admins(
        &mut conn,
        invitation.family_id,
        auth.user_id,
        NewNotification {
            family_id: Some(invitation.family_id),
            kind: NotificationKind::InvitationAccepted,
            message: format!("{} joined the family as {}", auth.email, invitation.role.as_str()),
            target_id: Some(auth.user_id),
        },
    )
    .await
}

pub async fn redeem_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidJson(req): ValidJson<RedeemRequest>,
) -> ApiResult<Json<RedeemResponse>> {
    let invitation = Invitation::redeem(&state.db, &req.code, auth.user_id, &auth.email).await?;

    // The membership is committed; a failed fan-out must not turn it into an error
    if let Err(e) = notify_joined(&state, &invitation, &auth).await {
        tracing::warn!(
            invitation_id = %invitation.id,
            error = %e,
            "Failed to notify admins of redeemed invitation"
        );
    }

    Ok(Json(RedeemResponse {
        family_id: invitation.family_id,
        role: invitation.role,
        invitation,
    }))
}
