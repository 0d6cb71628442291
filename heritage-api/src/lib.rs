//! # Family Heritage API Server Library
//!
//! REST backend for family groups sharing tales, crafts, proverbs and
//! riddles, with quizzes, genealogy trees, invitations and notifications.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration from the environment
//! - `error`: Error envelope and HTTP status mapping
//! - `extract`: Extractors that reject with the error envelope
//! - `middleware`: Authentication, error envelope, security headers
//! - `routes`: API route handlers
//! - `sweeper`: Background expiry of stale invitations

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod sweeper;
