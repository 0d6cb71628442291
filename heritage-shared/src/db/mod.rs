/// Database plumbing: connection pool and embedded migrations
///
/// Models live in [`crate::models`]; each model owns its SQL.

pub mod migrations;
pub mod pool;
