//! # Application State
//!
//! The shared state handed to every request handler. Axum clones it per
//! request, so everything heavy sits behind an `Arc`.
//!
//! The stores are built once here and passed into the `CeremonyCoordinator`
//! as trait objects; handlers never talk to SQLite directly.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db;
use crate::db::challenges::{ChallengeStore, SqliteChallengeStore};
use crate::db::credentials::{CredentialStore, SqliteCredentialStore};
use crate::db::users::{SqliteUserDirectory, UserDirectory};
use crate::session::SessionIssuer;
use crate::webauthn::CeremonyCoordinator;
use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,

    pub config: Arc<Config>,

    /// Registration and login ceremonies
    pub coordinator: Arc<CeremonyCoordinator>,

    /// Session token signing and verification, shared with the coordinator
    pub sessions: Arc<SessionIssuer>,

    /// Account lookups for the profile endpoint
    pub users: Arc<dyn UserDirectory>,

    /// Kept for the challenge janitor
    pub challenges: Arc<dyn ChallengeStore>,
}

impl AppState {
    /// Connect to the database, run migrations and wire up the stores.
    ///
    /// # Errors
    /// Returns an error if the database connection or a migration fails.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.database_url).await?;
        Ok(Self::with_pool(pool, config.clone(), Arc::new(SystemClock)))
    }

    /// Build the state over an existing pool and clock.
    pub fn with_pool(db: SqlitePool, config: Config, clock: Arc<dyn Clock>) -> Self {
        let challenges: Arc<dyn ChallengeStore> =
            Arc::new(SqliteChallengeStore::new(db.clone(), clock.clone()));
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(SqliteCredentialStore::new(db.clone(), clock.clone()));
        let users: Arc<dyn UserDirectory> = Arc::new(SqliteUserDirectory::new(db.clone()));
        let sessions = Arc::new(SessionIssuer::new(config.session.clone(), clock.clone()));

        let coordinator = Arc::new(CeremonyCoordinator::new(
            config.webauthn.clone(),
            challenges.clone(),
            credentials,
            users.clone(),
            sessions.clone(),
            clock,
        ));

        AppState {
            db,
            config: Arc::new(config),
            coordinator,
            sessions,
            users,
            challenges,
        }
    }
}
