use crate::clock::Clock;
use crate::db::models::{CeremonyKey, PendingCeremony, StoredChallenge};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Short-lived store for pending ceremonies.
///
/// Expired entries read as absent; callers never see a stale record and
/// never need to check `expires_at` themselves.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store `pending` under `key`, replacing whatever was there.
    async fn put(&self, key: &CeremonyKey, pending: &PendingCeremony, ttl: Duration) -> AppResult<()>;

    /// Read without side effects.
    async fn get(&self, key: &CeremonyKey) -> AppResult<Option<StoredChallenge>>;

    /// Read and invalidate in one step. Of two concurrent callers at most one
    /// gets the record.
    async fn take(&self, key: &CeremonyKey) -> AppResult<Option<StoredChallenge>>;

    /// Idempotent.
    async fn delete(&self, key: &CeremonyKey) -> AppResult<()>;

    /// Drop expired rows. Returns how many were removed.
    async fn purge_expired(&self) -> AppResult<u64>;
}

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    payload: String,
    created_at: i64,
    expires_at: i64,
}

pub struct SqliteChallengeStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteChallengeStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn decode(key: &CeremonyKey, row: ChallengeRow) -> AppResult<StoredChallenge> {
        let pending: PendingCeremony = serde_json::from_str(&row.payload)?;
        if pending.kind() != key.kind {
            return Err(AppError::Internal(format!("challenge under '{}' has wrong kind", key)));
        }

        Ok(StoredChallenge {
            key: key.clone(),
            pending,
            created_at: from_millis(row.created_at)?,
            expires_at: from_millis(row.expires_at)?,
        })
    }
}

fn from_millis(ms: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::Internal("Invalid challenge timestamp".to_string()))
}

#[async_trait]
impl ChallengeStore for SqliteChallengeStore {
    async fn put(&self, key: &CeremonyKey, pending: &PendingCeremony, ttl: Duration) -> AppResult<()> {
        let now = self.clock.now();
        let expires = now + ttl;
        let payload = serde_json::to_string(pending)?;

        sqlx::query(
            "INSERT INTO ceremony_challenges (ceremony_key, payload, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(ceremony_key) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
        )
        .bind(key.to_string())
        .bind(payload)
        .bind(now.timestamp_millis())
        .bind(expires.timestamp_millis())
        .execute(&self.pool)
        .await?;

        tracing::debug!(key = %key, expires_at = %expires, "stored pending ceremony");
        Ok(())
    }

    async fn get(&self, key: &CeremonyKey) -> AppResult<Option<StoredChallenge>> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            "SELECT payload, created_at, expires_at FROM ceremony_challenges
             WHERE ceremony_key = ? AND expires_at > ?",
        )
        .bind(key.to_string())
        .bind(self.now_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::decode(key, r)).transpose()
    }

    async fn take(&self, key: &CeremonyKey) -> AppResult<Option<StoredChallenge>> {
        // An expired row is removed too, but only a live one is returned
        let row = sqlx::query_as::<_, ChallengeRow>(
            "DELETE FROM ceremony_challenges WHERE ceremony_key = ?
             RETURNING payload, created_at, expires_at",
        )
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) if r.expires_at > self.now_millis() => Self::decode(key, r).map(Some),
            Some(_) => {
                tracing::debug!(key = %key, "discarded expired pending ceremony");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &CeremonyKey) -> AppResult<()> {
        sqlx::query("DELETE FROM ceremony_challenges WHERE ceremony_key = ?")
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM ceremony_challenges WHERE expires_at <= ?")
            .bind(self.now_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::models::{LoginType, PendingProfile};

    async fn store() -> (SqliteChallengeStore, Arc<ManualClock>) {
        let pool = crate::db::connect_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (SqliteChallengeStore::new(pool, clock.clone()), clock)
    }

    fn login(challenge: &str) -> PendingCeremony {
        PendingCeremony::Login {
            challenge: challenge.to_string(),
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_record() {
        let (store, _) = store().await;
        let key = CeremonyKey::login("u1");
        store.put(&key, &login("c1"), Duration::seconds(300)).await.unwrap();

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.pending.challenge(), "c1");
        assert_eq!(stored.expires_at - stored.created_at, Duration::seconds(300));

        // get has no side effects
        assert!(store.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn put_overwrites_existing_entry() {
        let (store, _) = store().await;
        let key = CeremonyKey::login("u1");
        store.put(&key, &login("old"), Duration::seconds(300)).await.unwrap();
        store.put(&key, &login("new"), Duration::seconds(300)).await.unwrap();

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.pending.challenge(), "new");
    }

    #[tokio::test]
    async fn expired_entry_reads_as_missing() {
        let (store, clock) = store().await;
        let key = CeremonyKey::login("u1");
        store.put(&key, &login("c1"), Duration::seconds(300)).await.unwrap();

        clock.advance(Duration::seconds(301));
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(store.take(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn take_is_single_use() {
        let (store, _) = store().await;
        let key = CeremonyKey::login("u1");
        store.put(&key, &login("c1"), Duration::seconds(300)).await.unwrap();

        assert!(store.take(&key).await.unwrap().is_some());
        assert!(store.take(&key).await.unwrap().is_none());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_key_is_a_no_op() {
        let (store, _) = store().await;
        let key = CeremonyKey::registration("nobody");
        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn registration_and_login_keys_do_not_collide() {
        let (store, _) = store().await;
        let reg = PendingCeremony::Registration {
            profile: PendingProfile {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                login_type: LoginType::Passkey,
            },
            challenge: "reg".to_string(),
        };
        store
            .put(&reg.key_for("u1"), &reg, Duration::seconds(300))
            .await
            .unwrap();
        store
            .put(&CeremonyKey::login("u1"), &login("auth"), Duration::seconds(300))
            .await
            .unwrap();

        let r = store.get(&CeremonyKey::registration("u1")).await.unwrap().unwrap();
        let l = store.get(&CeremonyKey::login("u1")).await.unwrap().unwrap();
        assert_eq!(r.pending, reg);
        assert_eq!(l.pending.challenge(), "auth");
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let (store, clock) = store().await;
        store
            .put(&CeremonyKey::login("short"), &login("a"), Duration::seconds(10))
            .await
            .unwrap();
        store
            .put(&CeremonyKey::login("long"), &login("b"), Duration::seconds(600))
            .await
            .unwrap();

        clock.advance(Duration::seconds(60));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get(&CeremonyKey::login("long")).await.unwrap().is_some());
    }
}
