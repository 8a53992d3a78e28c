use crate::db::models::{PasskeyCredential, User};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_by_id(&self, user_id: &str) -> AppResult<Option<User>>;

    /// Create a user and its first credential as one unit.
    ///
    /// Fails with `Conflict` if the email or credential id is already taken,
    /// and with `VerificationFailed` if the user id already exists (the same
    /// registration ceremony committed twice).
    async fn create_passkey_account(&self, user: &User, credential: &PasskeyCredential) -> AppResult<()>;
}

pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_id(&self, user_id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_passkey_account(&self, user: &User, credential: &PasskeyCredential) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let email_taken: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&user.email)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some((owner,)) = email_taken {
            if owner == user.id {
                return Err(AppError::verification("registration already committed"));
            }
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        sqlx::query(
            "INSERT INTO users (id, name, email, email_verified, login_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.login_type)
        .bind(&user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::verification("user id already committed")
            } else {
                AppError::Storage(e)
            }
        })?;

        sqlx::query(
            "INSERT INTO passkey_credentials
             (id, user_id, public_key, algorithm, counter, transports, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.id)
        .bind(&credential.user_id)
        .bind(&credential.public_key)
        .bind(credential.algorithm)
        .bind(credential.counter)
        .bind(&credential.transports)
        .bind(&credential.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Credential already registered".to_string())
            } else {
                AppError::Storage(e)
            }
        })?;

        // Dropping `tx` on any early return above rolls back
        tx.commit().await?;
        Ok(())
    }
}
