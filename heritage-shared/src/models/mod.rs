/// Database models for the family heritage platform
///
/// Each model owns its SQL: runtime-checked `sqlx::query_as` statements over
/// `FromRow` structs. Functions that may run inside a transaction take any
/// `PgExecutor`, so callers pass either the pool or `&mut *tx`.
///
/// # Models
///
/// - `user`: accounts and credentials
/// - `family`: families, the unit of isolation
/// - `membership`: user-family relationships with roles
/// - `invitation`: single-use, time-limited invitation codes
/// - `category`: per-family content categories
/// - `content`: tales, crafts, proverbs and riddles
/// - `media`: files attached to content
/// - `publication_request`: editor requests to publish
/// - `quiz`: quizzes, questions, propositions and results
/// - `genealogy`: trees and their members
/// - `notification`: per-user notifications

pub mod category;
pub mod content;
pub mod family;
pub mod genealogy;
pub mod invitation;
pub mod media;
pub mod membership;
pub mod notification;
pub mod publication_request;
pub mod quiz;
pub mod user;
