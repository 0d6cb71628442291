/// Error handling for the API server
///
/// Every failure leaves the server as the same JSON envelope:
///
/// ```json
/// { "status": 404, "error": "not_found", "message": "Content not found",
///   "path": "/v1/families/…/contents/…", "timestamp": "2026-01-01T00:00:00Z" }
/// ```
///
/// `details` is only present for validation errors. Handlers return
/// `ApiResult<T>`; [`ApiError::into_response`] renders the envelope without a
/// path and stashes it in the response extensions, where
/// [`crate::middleware::envelope`] fills in the request path.
///
/// # Example
///
/// ```
/// use heritage_api::error::{ApiError, ApiResult};
///
/// fn find(found: bool) -> ApiResult<&'static str> {
///     if !found {
///         return Err(ApiError::NotFound("Tree not found".to_string()));
///     }
///     Ok("tree")
/// }
/// # assert!(find(false).is_err());
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use heritage_shared::{
    auth::{
        authorization::AuthzError, jwt::JwtError, middleware::AuthError, password::PasswordError,
    },
    models::{invitation::RedeemError, quiz::GradeError},
    storage::StorageError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 401
    Unauthorized(String),

    /// 403
    Forbidden(String),

    /// 404
    NotFound(String),

    /// 409, e.g. duplicate email or a second pending request
    Conflict(String),

    /// 413
    PayloadTooLarge(String),

    /// 415
    UnsupportedMediaType(String),

    /// 422 with per-field details
    ValidationError(Vec<ValidationErrorDetail>),

    /// 500; the message is logged, never returned
    InternalError(String),

    /// 503
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,

    /// Machine-readable code, e.g. "not_found"
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            error: error_code(status).to_string(),
            message: message.into(),
            path: None,
            timestamp: Utc::now(),
            details: None,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.clone())).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Machine-readable code for a status
pub fn error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::METHOD_NOT_ALLOWED => "method_not_allowed",
        StatusCode::CONFLICT => "conflict",
        StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported_media_type",
        StatusCode::UNPROCESSABLE_ENTITY => "validation_error",
        StatusCode::INTERNAL_SERVER_ERROR => "internal_error",
        StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
        s if s.is_server_error() => "server_error",
        _ => "client_error",
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::UnsupportedMediaType(msg) => write!(f, "Unsupported media type: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, details) = match self {
            ApiError::ValidationError(errors) => {
                ("Request validation failed".to_string(), Some(errors))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("An internal error occurred".to_string(), None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::ServiceUnavailable(msg) => (msg, None),
        };

        let mut body = ErrorResponse::new(status, message);
        body.details = details;
        body.into_response()
    }
}

/// Message for a violated unique constraint
fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => "Email already registered",
        Some("family_memberships_pkey") => "User is already a member of this family",
        Some("categories_family_name_key") => "A category with this name already exists",
        Some("publication_requests_one_pending_per_content") => {
            "A publication request is already pending for this content"
        }
        Some("invitations_code_key") => "Invitation code collision, please retry",
        _ => "Resource already exists",
    }
}

/// Message for a violated check constraint
fn check_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("tree_members_dates_check") => "Death date cannot be before birth date",
        Some("tree_members_not_own_parent") => "A member cannot be their own parent",
        Some("quiz_results_score_check") => "Score out of range",
        _ => "Request violates a data constraint",
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is busy, please retry".to_string())
            }
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint();
                match db_err.code().as_deref() {
                    Some("23505") => ApiError::Conflict(conflict_message(constraint).to_string()),
                    Some("23503") => {
                        ApiError::BadRequest("Referenced resource does not exist".to_string())
                    }
                    Some("23514") => ApiError::BadRequest(check_message(constraint).to_string()),
                    Some("22P02") => ApiError::BadRequest("Malformed value".to_string()),
                    Some("22001") => {
                        ApiError::BadRequest("Value is too long for this field".to_string())
                    }
                    _ => ApiError::InternalError(format!("Database error: {}", db_err)),
                }
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing credentials".to_string())
            }
            AuthError::InvalidFormat(msg) | AuthError::InvalidToken(msg) => {
                ApiError::Unauthorized(msg)
            }
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotMember(_) => {
                ApiError::Forbidden("Not a member of this family".to_string())
            }
            AuthzError::InsufficientRole { required, .. } => ApiError::Forbidden(format!(
                "Insufficient permissions: {} role required",
                required.as_str()
            )),
            AuthzError::NotAuthorized => {
                ApiError::Forbidden("Not authorized to modify this resource".to_string())
            }
            AuthzError::DatabaseError(err) => err.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => {
                ApiError::InternalError(format!("Token creation failed: {}", msg))
            }
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            JwtError::WrongType { expected } => {
                ApiError::Unauthorized(format!("Expected {} token", expected))
            }
            JwtError::ValidationError(_) => ApiError::Unauthorized("Invalid token".to_string()),
        }
    }
}

impl From<RedeemError> for ApiError {
    fn from(err: RedeemError) -> Self {
        match err {
            RedeemError::NotFound => ApiError::NotFound(err.to_string()),
            RedeemError::AlreadyAccepted | RedeemError::AlreadyMember => {
                ApiError::Conflict(err.to_string())
            }
            RedeemError::Expired => ApiError::BadRequest(err.to_string()),
            RedeemError::EmailMismatch => ApiError::Forbidden(err.to_string()),
            RedeemError::Database(db) => db.into(),
        }
    }
}

impl From<GradeError> for ApiError {
    fn from(err: GradeError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::InternalError(format!("Storage failure: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", e.code)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heritage_shared::models::membership::FamilyRole;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::not_found("Family");
        assert_eq!(err.to_string(), "Not found: Family not found");
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let response = ApiError::Conflict("Email already registered".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.extensions().get::<ErrorResponse>().is_some());

        let json = body_json(response).await;
        assert_eq!(json["status"], 409);
        assert_eq!(json["error"], "conflict");
        assert_eq!(json["message"], "Email already registered");
        assert!(json["timestamp"].is_string());
        assert!(json.get("details").is_none());
        assert!(json.get("path").is_none());
    }

    #[tokio::test]
    async fn test_validation_details() {
        let response = ApiError::validation("title", "Title is required").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let json = body_json(response).await;
        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["details"][0]["field"], "title");
        assert_eq!(json["details"][0]["message"], "Title is required");
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let response = ApiError::InternalError("connection string leaked".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["message"], "An internal error occurred");
    }

    #[test]
    fn test_row_not_found_is_404() {
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }

    /// Postgres error carrying only a SQLSTATE
    #[derive(Debug)]
    struct PgCode(&'static str);

    impl fmt::Display for PgCode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "SQLSTATE {}", self.0)
        }
    }

    impl std::error::Error for PgCode {}

    impl sqlx::error::DatabaseError for PgCode {
        fn message(&self) -> &str {
            "database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn db_status(code: &'static str) -> StatusCode {
        ApiError::from(sqlx::Error::Database(Box::new(PgCode(code)))).status()
    }

    #[test]
    fn test_sqlstate_statuses() {
        assert_eq!(db_status("23505"), StatusCode::CONFLICT);
        assert_eq!(db_status("23503"), StatusCode::BAD_REQUEST);
        assert_eq!(db_status("23514"), StatusCode::BAD_REQUEST);
        assert_eq!(db_status("22P02"), StatusCode::BAD_REQUEST);
        // string_data_right_truncation: value longer than its VARCHAR
        assert_eq!(db_status("22001"), StatusCode::BAD_REQUEST);
        assert_eq!(db_status("40P01"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_redeem_error_statuses() {
        let cases = [
            (RedeemError::NotFound, StatusCode::NOT_FOUND),
            (RedeemError::AlreadyAccepted, StatusCode::CONFLICT),
            (RedeemError::AlreadyMember, StatusCode::CONFLICT),
            (RedeemError::Expired, StatusCode::BAD_REQUEST),
            (RedeemError::EmailMismatch, StatusCode::FORBIDDEN),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_authz_errors_are_forbidden() {
        let err = ApiError::from(AuthzError::InsufficientRole {
            required: FamilyRole::Admin,
            actual: FamilyRole::Editor,
        });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Forbidden: Insufficient permissions: admin role required");

        assert_eq!(
            ApiError::from(AuthzError::NotMember(uuid::Uuid::nil())).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_auth_errors_are_unauthorized() {
        assert_eq!(ApiError::from(AuthError::MissingCredentials).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(JwtError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(JwtError::CreateError("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_constraint_messages() {
        assert_eq!(conflict_message(Some("users_email_key")), "Email already registered");
        assert_eq!(conflict_message(None), "Resource already exists");
        assert_eq!(
            check_message(Some("tree_members_dates_check")),
            "Death date cannot be before birth date"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(error_code(StatusCode::NOT_FOUND), "not_found");
        assert_eq!(error_code(StatusCode::PAYLOAD_TOO_LARGE), "payload_too_large");
        assert_eq!(error_code(StatusCode::IM_A_TEAPOT), "client_error");
        assert_eq!(error_code(StatusCode::BAD_GATEWAY), "server_error");
    }
}
