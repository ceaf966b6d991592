//! Database connection management

use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Type alias for the database pool
pub type DbPool = PgPool;

/// Create a new database connection pool
///
/// The pool is shared by the worker loop and the completion poller, so it
/// needs a couple of spare connections beyond the batch fan-out.
pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Create a pool from the DATABASE_URL environment variable
pub async fn create_pool_from_env() -> Result<DbPool> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| crate::error::IngestError::ConfigError("DATABASE_URL not set".to_string()))?;

    create_pool(&database_url).await
}
