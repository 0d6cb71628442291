/// Completes error envelopes with the request path
///
/// [`ApiError`](crate::error::ApiError) responses carry their
/// [`ErrorResponse`] in the response extensions; this middleware adds the
/// path and re-renders the body. Error responses produced outside the
/// handlers (unmatched methods, missing static files, body limits) get a
/// fresh envelope so clients only ever see one error shape.

use crate::error::ErrorResponse;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

pub async fn error_envelope(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();

    let mut envelope = match parts.extensions.remove::<ErrorResponse>() {
        Some(envelope) => envelope,
        // Some other JSON body; leave it alone
        None if is_json(&parts.headers) => return Response::from_parts(parts, body),
        None => ErrorResponse::new(status, status.canonical_reason().unwrap_or("Request failed")),
    };
    envelope.path = Some(path);

    let bytes = match serde_json::to_vec(&envelope) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error envelope");
            return Response::from_parts(parts, body);
        }
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    parts.extensions.insert(envelope);

    Response::from_parts(parts, Body::from(bytes))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("application/json"))
}
