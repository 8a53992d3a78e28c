//! The `CeremonyCoordinator`: everything the four ceremony operations need,
//! injected at construction.
//!
//! The ceremony methods themselves live in `registration` and
//! `authentication`.

use std::sync::Arc;

use ring::rand::{SecureRandom, SystemRandom};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::WebauthnConfig;
use crate::db::challenges::ChallengeStore;
use crate::db::credentials::CredentialStore;
use crate::db::models::User;
use crate::db::users::UserDirectory;
use crate::error::{AppError, AppResult};
use crate::session::{IssuedSession, SessionIssuer};
use crate::webauthn::{b64_decode, b64_encode};

/// Challenge length in bytes
pub const CHALLENGE_LEN: usize = 32;

/// What a successful verify hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct CeremonyOutcome {
    pub user: User,
    pub session: IssuedSession,
}

pub struct CeremonyCoordinator {
    pub(crate) config: WebauthnConfig,
    pub(crate) challenges: Arc<dyn ChallengeStore>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) sessions: Arc<SessionIssuer>,
    pub(crate) clock: Arc<dyn Clock>,
    rng: SystemRandom,
}

impl CeremonyCoordinator {
    pub fn new(
        config: WebauthnConfig,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialStore>,
        users: Arc<dyn UserDirectory>,
        sessions: Arc<SessionIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            challenges,
            credentials,
            users,
            sessions,
            clock,
            rng: SystemRandom::new(),
        }
    }

    /// A fresh CSPRNG challenge, base64url encoded.
    pub(crate) fn generate_challenge(&self) -> AppResult<String> {
        let mut bytes = [0u8; CHALLENGE_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal("Failed to generate challenge".to_string()))?;
        Ok(b64_encode(&bytes))
    }
}

/// Emails are matched case-insensitively; they are stored lowercased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The WebAuthn user handle for a user id: base64url of the 16 UUID bytes.
pub fn user_handle(user_id: &Uuid) -> String {
    b64_encode(user_id.as_bytes())
}

/// Accept the `userId` of a verify body either as the UUID string returned by
/// the options call or as the base64url user handle.
pub fn parse_user_id(raw: &str) -> AppResult<Uuid> {
    let raw = raw.trim();
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }

    b64_decode("userId", raw)
        .ok()
        .and_then(|bytes| Uuid::from_slice(&bytes).ok())
        .ok_or_else(|| AppError::BadRequest("Invalid userId".to_string()))
}
