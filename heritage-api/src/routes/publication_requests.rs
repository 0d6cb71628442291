/// Publication requests: editors asking admins to publish a draft
///
/// - `POST /v1/families/:family_id/publication-requests` - editor+
/// - `GET /v1/families/:family_id/publication-requests[?status=pending]`
/// - `POST /v1/families/:family_id/publication-requests/:request_id/review`
///   - admin approves or rejects
///
/// Only one request per content item may be pending. Approving publishes
/// the content in the same transaction as the review.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiPath, ApiQuery, ValidJson},
    routes::contents::{announce_published, load_visible},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heritage_shared::{
    auth::{
        authorization::{check_role, require_permission, FamilyPermission},
        middleware::AuthContext,
    },
    models::{
        content::{Content, ContentStatus},
        membership::FamilyRole,
        notification::{NewNotification, Notification, NotificationKind},
        publication_request::{PublicationRequest, PublicationStatus, ReviewDecision},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRequestBody {
    pub content_id: Uuid,

    #[validate(length(max = 1000, message = "Message must be at most 1000 characters"))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<PublicationStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewBody {
    pub decision: ReviewDecision,

    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub request: PublicationRequest,

    /// Present when the request was approved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

pub async fn create_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ValidJson(body): ValidJson<CreateRequestBody>,
) -> ApiResult<(StatusCode, Json<PublicationRequest>)> {
    let (content, role) = load_visible(&state, family_id, body.content_id, auth.user_id).await?;
    check_role(role, FamilyRole::Editor)?;

    if content.status != ContentStatus::Draft {
        return Err(ApiError::Conflict(
            "Only draft content can be submitted for publication".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;

    let request =
        PublicationRequest::create(&mut *tx, family_id, content.id, auth.user_id, body.message)
            .await?;

    Notification::notify_admins(
        &mut tx,
        family_id,
        auth.user_id,
        NewNotification {
            family_id: Some(family_id),
            kind: NotificationKind::PublicationRequested,
            message: format!("{} asks to publish \"{}\"", auth.email, content.title),
            target_id: Some(request.id),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        family_id = %family_id,
        request_id = %request.id,
        content_id = %content.id,
        "Publication requested"
    );

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<RequestListQuery>,
) -> ApiResult<Json<Vec<PublicationRequest>>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    Ok(Json(
        PublicationRequest::list_by_family(&state.db, family_id, query.status).await?,
    ))
}

pub async fn review_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, request_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(body): ValidJson<ReviewBody>,
) -> ApiResult<Json<ReviewResponse>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Manage).await?;

    let mut tx = state.db.begin().await?;

    let pending = PublicationRequest::find_for_update(&mut *tx, family_id, request_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Publication request"))?;

    if pending.status != PublicationStatus::Pending {
        return Err(ApiError::Conflict(
            "Publication request has already been reviewed".to_string(),
        ));
    }

    let content = match body.decision {
        ReviewDecision::Approve => Some(
            Content::transition(
                &mut *tx,
                pending.content_id,
                ContentStatus::Draft,
                ContentStatus::Published,
            )
            .await?
            .ok_or_else(|| ApiError::Conflict("Content is no longer a draft".to_string()))?,
        ),
        ReviewDecision::Reject => None,
    };

    let request =
        PublicationRequest::record_review(&mut *tx, pending.id, auth.user_id, body.decision, body.comment)
            .await?
            .ok_or_else(|| {
                ApiError::Conflict("Publication request has already been reviewed".to_string())
            })?;

    if let Some(requester) = request.requested_by {
        let verdict = match body.decision {
            ReviewDecision::Approve => "approved",
            ReviewDecision::Reject => "rejected",
        };
        Notification::notify_user(
            &mut tx,
            requester,
            auth.user_id,
            NewNotification {
                family_id: Some(family_id),
                kind: NotificationKind::PublicationReviewed,
                message: format!("Your publication request was {}", verdict),
                target_id: Some(request.content_id),
            },
        )
        .await?;
    }

    if let Some(published) = &content {
        announce_published(&mut tx, published, auth.user_id).await?;
    }

    tx.commit().await?;

    tracing::info!(
        request_id = %request.id,
        decision = ?body.decision,
        reviewer_id = %auth.user_id,
        "Publication request reviewed"
    );

    Ok(Json(ReviewResponse { request, content }))
}
