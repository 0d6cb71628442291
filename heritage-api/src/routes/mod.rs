/// API route handlers, organized by resource
///
/// Every handler under `/v1` except `auth` runs behind
/// [`require_auth`](crate::middleware::auth::require_auth) and reads the
/// caller from `Extension<AuthContext>`. Family-scoped handlers check the
/// caller's role themselves before touching data.

pub mod auth;
pub mod categories;
pub mod contents;
pub mod families;
pub mod genealogy;
pub mod health;
pub mod invitations;
pub mod media;
pub mod notifications;
pub mod publication_requests;
pub mod quizzes;
pub mod users;
