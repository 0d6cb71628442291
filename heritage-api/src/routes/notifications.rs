/// The caller's own notifications
///
/// - `GET /v1/notifications[?unread_only=true&limit=50&offset=0]`
/// - `GET /v1/notifications/unread-count`
/// - `POST /v1/notifications/read-all`
/// - `POST /v1/notifications/:notification_id/read`
/// - `DELETE /v1/notifications/:notification_id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiPath, ApiQuery},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heritage_shared::{auth::middleware::AuthContext, models::notification::Notification};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,

    #[validate(range(min = 1, max = 100, message = "Limit must be 1-100"))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0, message = "Offset must not be negative"))]
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    query.validate()?;

    let notifications = Notification::list_for_user(
        &state.db,
        auth.user_id,
        query.unread_only,
        query.limit,
        query.offset,
    )
    .await?;

    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UnreadCount>> {
    let unread = Notification::unread_count(&state.db, auth.user_id).await?;
    Ok(Json(UnreadCount { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = Notification::mark_read(&state.db, auth.user_id, notification_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;

    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MarkedRead>> {
    let updated = Notification::mark_all_read(&state.db, auth.user_id).await?;
    Ok(Json(MarkedRead { updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(notification_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if !Notification::delete(&state.db, auth.user_id, notification_id).await? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(StatusCode::NO_CONTENT)
}
