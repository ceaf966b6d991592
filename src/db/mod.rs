//! Database module for the shared pages backlog
//!
//! Provides PostgreSQL operations for the `pages` and `datasheets` tables.
//! All cross-worker coordination happens through single-row conditional
//! updates on `pages`; there are no multi-row transactions.

pub mod connection;
pub mod datasheets;
pub mod models;
pub mod pages;

pub use connection::{create_pool, create_pool_from_env, DbPool};
pub use models::*;
