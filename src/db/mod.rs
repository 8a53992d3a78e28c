//! # Database Module
//!
//! - `models`: row types and the pending-ceremony record
//! - `users`: the user directory
//! - `credentials`: the passkey credential store
//! - `challenges`: the TTL-bound pending-ceremony store
//!
//! Each store is a trait with a SQLite implementation; the ceremony code only
//! sees the traits.

pub mod challenges;
pub mod credentials;
pub mod models;
pub mod users;

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Connect to the database and bring the schema up to date.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// A migrated in-memory database.
///
/// Every SQLite connection to `:memory:` opens its own database, so the pool
/// is pinned to a single connection that is never recycled.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
