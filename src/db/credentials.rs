//! # Credential Database Operations
//!
//! Lookup and counter maintenance for passkey credentials. New credentials
//! are written together with their user (see `users::create_passkey_account`)
//! so a half-created account is never visible.
//!
//! ## Security Note
//! Only public keys are stored - private keys never leave the user's device.

use crate::clock::Clock;
use crate::db::models::PasskeyCredential;
use crate::error::AppResult;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All credentials owned by a user. Empty if none.
    async fn find_by_user_id(&self, user_id: &str) -> AppResult<Vec<PasskeyCredential>>;

    /// Advance the signature counter of a credential.
    ///
    /// The write only lands if `new_counter` is greater than the counter
    /// currently stored, or (with `allow_zero`) if both are zero. Returns
    /// `false` when the guard rejected the write, which means another login
    /// got there first with the same or a later counter.
    async fn advance_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
        allow_zero: bool,
    ) -> AppResult<bool>;
}

pub struct SqliteCredentialStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_user_id(&self, user_id: &str) -> AppResult<Vec<PasskeyCredential>> {
        let credentials = sqlx::query_as::<_, PasskeyCredential>(
            "SELECT * FROM passkey_credentials WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(credentials)
    }

    async fn advance_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
        allow_zero: bool,
    ) -> AppResult<bool> {
        let now = self.clock.now().to_rfc3339();
        let new_counter = i64::from(new_counter);

        // Compare-and-set: two logins replaying one assertion cannot both land
        let result = sqlx::query(
            "UPDATE passkey_credentials
             SET counter = ?, last_used_at = ?
             WHERE id = ?
               AND (counter < ? OR (? AND counter = 0 AND ? = 0))",
        )
        .bind(new_counter)
        .bind(now)
        .bind(credential_id)
        .bind(new_counter)
        .bind(allow_zero)
        .bind(new_counter)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
