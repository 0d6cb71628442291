/// Bearer-token authentication for protected routes
///
/// Validates the access token in `Authorization: Bearer <token>` and inserts
/// the caller's [`AuthContext`] into the request extensions. Handlers read it
/// back with `Extension<AuthContext>`.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use heritage_shared::auth::middleware::{authenticate, AuthContext};

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context: AuthContext = authenticate(req.headers(), state.jwt_secret()).map_err(|e| {
        tracing::debug!(error = %e, path = %req.uri().path(), "Rejected request");
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}
