/// Profile endpoints for the authenticated user
///
/// - `GET /v1/users/me`
/// - `PUT /v1/users/me` - display name and avatar URL
/// - `PUT /v1/users/me/password` - requires the current password

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{nullable, ValidJson},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heritage_shared::{
    auth::{middleware::AuthContext, password},
    models::user::{UpdateUser, User},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Display name must be 1-100 characters"))]
    pub display_name: Option<String>,

    /// `null` removes the avatar
    #[validate(length(max = 512, message = "Avatar URL must be at most 512 characters"))]
    #[serde(default, deserialize_with = "nullable")]
    pub avatar_url: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    pub new_password: String,
}

/// Absolute http(s) URL or a same-origin path
///
/// `//host/...` is protocol-relative and would load from another origin.
fn check_avatar_url(url: &str) -> ApiResult<()> {
    let allowed = url.starts_with("https://")
        || url.starts_with("http://")
        || (url.starts_with('/') && !url.starts_with("//"));

    if !allowed {
        return Err(ApiError::validation(
            "avatar_url",
            "Avatar URL must be an http(s) URL or a path",
        ));
    }
    Ok(())
}

async fn current_user(state: &AppState, auth: &AuthContext) -> ApiResult<User> {
    // A valid token for a deleted account
    User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    Ok(Json(current_user(&state, &auth).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    if let Some(Some(url)) = &req.avatar_url {
        check_avatar_url(url)?;
    }

    let update = UpdateUser {
        display_name: req.display_name.map(|n| n.trim().to_string()),
        avatar_url: req.avatar_url,
    };

    let user = User::update_profile(&state.db, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    Ok(Json(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let user = current_user(&state, &auth).await?;

    if !password::verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized("Current password is incorrect".to_string()));
    }

    password::validate_password_strength(&req.new_password)
        .map_err(|e| ApiError::validation("new_password", e))?;

    let hash = password::hash_password(&req.new_password)?;
    User::update_password(&state.db, user.id, &hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_url_schemes() {
        assert!(check_avatar_url("https://cdn.example.com/a.png").is_ok());
        assert!(check_avatar_url("http://example.com/a.png").is_ok());
        assert!(check_avatar_url("/uploads/a.png").is_ok());

        for url in ["//evil.example.com/a.png", "javascript:alert(1)", "ftp://x/a.png", "a.png"] {
            let err = check_avatar_url(url).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY, "{}", url);
        }
    }

    #[test]
    fn test_avatar_url_length_matches_column() {
        let fits = format!("https://example.com/{}", "a".repeat(512 - 20));
        let req: UpdateProfileRequest =
            serde_json::from_value(serde_json::json!({ "avatar_url": fits })).unwrap();
        assert!(req.validate().is_ok());

        let too_long = format!("https://example.com/{}", "a".repeat(600));
        let req: UpdateProfileRequest =
            serde_json::from_value(serde_json::json!({ "avatar_url": too_long })).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateProfileRequest =
            serde_json::from_value(serde_json::json!({ "avatar_url": null })).unwrap();
        assert!(req.validate().is_ok());
    }
}
