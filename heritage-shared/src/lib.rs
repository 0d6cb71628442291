//! # Family Heritage Shared Library
//!
//! Domain types, persistence and security primitives used by the Family
//! Heritage API server.
//!
//! ## Module Organization
//!
//! - `auth`: passwords, JWTs, invitation codes, request authentication, role checks
//! - `db`: connection pool and embedded migrations
//! - `models`: database models and their queries
//! - `storage`: media file storage behind the `MediaStore` trait

pub mod auth;
pub mod db;
pub mod models;
pub mod storage;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
