/// Middleware for the API server
///
/// - `auth`: bearer-token authentication for protected routes
/// - `envelope`: fills the request path into error envelopes
/// - `security`: security response headers

pub mod auth;
pub mod envelope;
pub mod security;
