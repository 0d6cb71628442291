/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use heritage_api::{app::AppState, config::Config};
/// use heritage_shared::storage::local::LocalMediaStore;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let media = Arc::new(LocalMediaStore::new(&config.uploads.dir, "/uploads"));
/// let state = AppState::new(pool, config, media);
/// let app = heritage_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{auth::require_auth, envelope::error_envelope, security::SecurityHeadersLayer},
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use heritage_shared::{auth::jwt::TokenTtl, storage::MediaStore};
use sqlx::PgPool;
use std::{any::Any, sync::Arc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Public URL prefix of uploaded files
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    pub config: Arc<Config>,

    /// Where uploaded media bytes go
    pub media: Arc<dyn MediaStore>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config, media: Arc<dyn MediaStore>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            media,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn token_ttl(&self) -> TokenTtl {
        self.config.jwt.token_ttl()
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                              # public
/// ├── /uploads/*                           # static media files
/// └── /v1/
///     ├── /auth/{register,login,refresh}   # public
///     ├── /users/me[/password|/quiz-results]
///     ├── /families[/:family_id]
///     │   ├── /members[/:user_id]  /leave
///     │   ├── /invitations[/:invitation_id]
///     │   ├── /categories[/:category_id]
///     │   ├── /contents[/:content_id[/status|/media[/:media_id]]]
///     │   ├── /publication-requests[/:request_id/review]
///     │   ├── /quizzes[/:quiz_id[/submit|/results]]
///     │   └── /trees[/:tree_id[/members[/:member_id]]]
///     ├── /invitations/redeem
///     └── /notifications[/unread-count|/read-all|/:id[/read]]
/// ```
///
/// Everything under `/v1` except `/v1/auth` requires a bearer access token.
///
/// # Middleware Stack
///
/// Outermost first: trace, compression, CORS, security headers, error
/// envelope, panic catcher, then per-route authentication.
pub fn build_router(state: AppState) -> Router {
    use crate::routes::{
        auth, categories, contents, families, genealogy, health, invitations, media,
        notifications, publication_requests, quizzes, users,
    };

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh));

    let family_routes = Router::new()
        .route("/", post(families::create_family).get(families::list_families))
        .route(
            "/:family_id",
            get(families::get_family)
                .put(families::update_family)
                .delete(families::delete_family),
        )
        .route("/:family_id/members", get(families::list_members))
        .route(
            "/:family_id/members/:user_id",
            put(families::change_member_role).delete(families::remove_member),
        )
        .route("/:family_id/leave", post(families::leave_family))
        .route(
            "/:family_id/invitations",
            post(invitations::create_invitation).get(invitations::list_invitations),
        )
        .route(
            "/:family_id/invitations/:invitation_id",
            axum::routing::delete(invitations::revoke_invitation),
        )
        .route(
            "/:family_id/categories",
            post(categories::create_category).get(categories::list_categories),
        )
        .route(
            "/:family_id/categories/:category_id",
            put(categories::update_category).delete(categories::delete_category),
        )
        .route(
            "/:family_id/contents",
            post(contents::create_content).get(contents::list_contents),
        )
        .route(
            "/:family_id/contents/:content_id",
            get(contents::get_content)
                .put(contents::update_content)
                .delete(contents::delete_content),
        )
        .route(
            "/:family_id/contents/:content_id/status",
            put(contents::change_status),
        )
        .route(
            "/:family_id/contents/:content_id/media",
            post(media::upload_media).get(media::list_media),
        )
        .route(
            "/:family_id/contents/:content_id/media/:media_id",
            axum::routing::delete(media::delete_media),
        )
        .route(
            "/:family_id/publication-requests",
            post(publication_requests::create_request).get(publication_requests::list_requests),
        )
        .route(
            "/:family_id/publication-requests/:request_id/review",
            post(publication_requests::review_request),
        )
        .route(
            "/:family_id/quizzes",
            post(quizzes::create_quiz).get(quizzes::list_quizzes),
        )
        .route(
            "/:family_id/quizzes/:quiz_id",
            get(quizzes::get_quiz).delete(quizzes::delete_quiz),
        )
        .route("/:family_id/quizzes/:quiz_id/submit", post(quizzes::submit_quiz))
        .route("/:family_id/quizzes/:quiz_id/results", get(quizzes::list_results))
        .route(
            "/:family_id/trees",
            post(genealogy::create_tree).get(genealogy::list_trees),
        )
        .route(
            "/:family_id/trees/:tree_id",
            get(genealogy::get_tree)
                .put(genealogy::update_tree)
                .delete(genealogy::delete_tree),
        )
        .route("/:family_id/trees/:tree_id/members", post(genealogy::add_member))
        .route(
            "/:family_id/trees/:tree_id/members/:member_id",
            put(genealogy::update_member).delete(genealogy::delete_member),
        );

    let user_routes = Router::new()
        .route("/me", get(users::get_me).put(users::update_me))
        .route("/me/password", put(users::change_password))
        .route("/me/quiz-results", get(quizzes::my_results));

    let notification_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/:notification_id/read", post(notifications::mark_read))
        .route(
            "/:notification_id",
            axum::routing::delete(notifications::delete_notification),
        );

    let protected_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/families", family_routes)
        .route("/invitations/redeem", post(invitations::redeem_invitation))
        .nest("/notifications", notification_routes)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(protected_routes);

    let body_limit = state.config.uploads.max_bytes + MULTIPART_OVERHEAD;
    let uploads = ServeDir::new(&state.config.uploads.dir);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", v1_routes)
        .nest_service(UPLOADS_PREFIX, uploads)
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn(error_envelope))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .layer(cors_layer(&state.config))
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// CORS: the configured origins; any origin outside production when none are set
fn cors_layer(config: &Config) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE];

    let origins = &config.api.cors_origins;
    if origins.iter().any(|o| o == "*") || (origins.is_empty() && !config.api.production) {
        return CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

async fn fallback() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    ApiError::InternalError(format!("Handler panicked: {}", detail)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_becomes_internal_error() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<crate::error::ErrorResponse>().is_some());
    }
}
