/// Authentication endpoints
///
/// - `POST /v1/auth/register` - Register a new user
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for an access token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidJson,
};
use axum::{extract::State, http::StatusCode, Json};
use heritage_shared::{
    auth::{jwt, password},
    models::user::{CreateUser, User},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Same message for unknown email and wrong password
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: String,

    /// Strength is checked separately
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Display name must be 1-100 characters"))]
    pub display_name: String,
}

/// Returned by register and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,

    #[serde(flatten)]
    pub tokens: jwt::TokenPair,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// {
///   "email": "linh@example.com",
///   "password": "Banyan#Tree1",
///   "display_name": "Linh"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "user_id": "uuid",
///   "access_token": "eyJ...",
///   "refresh_token": "eyJ...",
///   "token_type": "Bearer",
///   "expires_in": 86400
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Malformed body
/// - `409 Conflict`: Email already registered
/// - `422 Unprocessable Entity`: Validation failed (including weak password)
pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::validation("password", e))?;

    if User::email_exists(&state.db, &req.email).await? {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    // The unique index still guards against a concurrent registration
    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            display_name: req.display_name.trim().to_string(),
        },
    )
    .await?;

    let tokens = jwt::issue_token_pair(user.id, &user.email, state.jwt_secret(), &state.token_ttl())?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: user.id,
            tokens,
        }),
    ))
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// Content-Type: application/json
///
/// { "email": "linh@example.com", "password": "Banyan#Tree1" }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password
pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = User::find_by_email(&state.db, &req.email).await?;

    // Unknown emails still pay for a hash verification
    let hash = user.as_ref().map(|u| u.password_hash.as_str());
    let verified = password::verify_account_password(&req.password, hash)?;

    let user = match user {
        Some(user) if verified => user,
        Some(user) => {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        None => return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string())),
    };

    User::update_last_login(&state.db, user.id).await?;

    let tokens = jwt::issue_token_pair(user.id, &user.email, state.jwt_secret(), &state.token_ttl())?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        tokens,
    }))
}

/// Token refresh endpoint
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/refresh
/// Content-Type: application/json
///
/// { "refresh_token": "eyJ..." }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired refresh token, or an access
///   token was sent instead
pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let (access_token, claims) = jwt::refresh_access_token(
        &req.refresh_token,
        state.jwt_secret(),
        state.token_ttl().access,
    )?;

    Ok(Json(RefreshResponse {
        access_token,
        token_type: "Bearer",
        expires_in: claims.expires_in_seconds(),
    }))
}
