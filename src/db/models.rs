//! # Database Models
//!
//! Structs that map to the tables in `migrations/`, plus the transient
//! pending-ceremony record kept in the challenge store.
//!
//! ## Key Concepts
//! - **User**: created only when a registration ceremony commits
//! - **PasskeyCredential**: the public half of a WebAuthn key pair plus its
//!   signature counter
//! - **PendingCeremony**: what the server remembers between the options call
//!   and the verify call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an account signs in.
///
/// Only `Passkey` accounts are created here; the other variants exist because
/// the users table is shared with the password and OAuth flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Password,
    Passkey,
    Oauth,
}

impl LoginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginType::Password => "password",
            LoginType::Passkey => "passkey",
            LoginType::Oauth => "oauth",
        }
    }
}

impl FromStr for LoginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(LoginType::Password),
            "passkey" => Ok(LoginType::Passkey),
            "oauth" => Ok(LoginType::Oauth),
            other => Err(format!("unknown login type '{}'", other)),
        }
    }
}

impl fmt::Display for LoginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account information
///
/// `id` is a UUID generated when registration *starts*; the same UUID is sent
/// to the authenticator as the WebAuthn user handle, so it has to survive
/// unchanged until the ceremony commits.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// UUID v4, e.g. "550e8400-e29b-41d4-a716-446655440000"
    pub id: String,

    /// Display name
    pub name: String,

    /// Unique, used to look the account up at login
    pub email: String,

    /// Set by the email-verification side channel, never by this service
    pub email_verified: bool,

    /// Stored as text: "password" | "passkey" | "oauth"
    pub login_type: String,

    /// RFC3339 timestamp
    pub created_at: String,
}

impl User {
    /// A passkey account for a registration that just verified.
    pub fn new_passkey(id: String, name: String, email: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            email,
            email_verified: false,
            login_type: LoginType::Passkey.as_str().to_string(),
            created_at: now.to_rfc3339(),
        }
    }

    pub fn login_type(&self) -> Option<LoginType> {
        self.login_type.parse().ok()
    }
}

/// Passkey credential stored for a user
///
/// Only the public key is stored; the private key never leaves the
/// authenticator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasskeyCredential {
    /// Credential id as issued by the authenticator, base64url without padding
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// COSE_Key bytes exactly as found in the attested credential data
    pub public_key: Vec<u8>,

    /// COSE algorithm identifier (-7 ES256, -8 EdDSA, -257 RS256)
    pub algorithm: i64,

    /// Signature counter from the last successful ceremony.
    /// SQLite has no unsigned type, so this is widened to i64.
    pub counter: i64,

    /// JSON array of transport hints, e.g. `["internal","hybrid"]`
    pub transports: Option<String>,

    /// RFC3339 timestamp
    pub created_at: String,

    /// Updated on every successful login
    pub last_used_at: Option<String>,
}

impl PasskeyCredential {
    pub fn counter(&self) -> u32 {
        u32::try_from(self.counter).unwrap_or(u32::MAX)
    }

    pub fn transports(&self) -> Vec<String> {
        self.transports
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}

/// Which ceremony a pending record belongs to. Also the key namespace, so a
/// registration and a login for the same user id never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    Registration,
    Login,
}

impl CeremonyKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            CeremonyKind::Registration => "register",
            CeremonyKind::Login => "login",
        }
    }
}

/// Challenge store key: `register:{user_id}` or `login:{user_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CeremonyKey {
    pub kind: CeremonyKind,
    pub subject: String,
}

impl CeremonyKey {
    pub fn registration(user_id: &str) -> Self {
        Self {
            kind: CeremonyKind::Registration,
            subject: user_id.to_string(),
        }
    }

    pub fn login(user_id: &str) -> Self {
        Self {
            kind: CeremonyKind::Login,
            subject: user_id.to_string(),
        }
    }
}

impl fmt::Display for CeremonyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.subject)
    }
}

/// Profile captured at registration start, not yet a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingProfile {
    pub name: String,
    pub email: String,
    pub login_type: LoginType,
}

/// Server-side half of a ceremony in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingCeremony {
    Registration {
        profile: PendingProfile,
        /// base64url, unpadded
        challenge: String,
    },
    Login {
        challenge: String,
    },
}

impl PendingCeremony {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            PendingCeremony::Registration { .. } => CeremonyKind::Registration,
            PendingCeremony::Login { .. } => CeremonyKind::Login,
        }
    }

    pub fn challenge(&self) -> &str {
        match self {
            PendingCeremony::Registration { challenge, .. } => challenge,
            PendingCeremony::Login { challenge } => challenge,
        }
    }

    /// The key this record lives under for the given subject.
    pub fn key_for(&self, user_id: &str) -> CeremonyKey {
        CeremonyKey {
            kind: self.kind(),
            subject: user_id.to_string(),
        }
    }
}

/// A pending ceremony as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredChallenge {
    pub key: CeremonyKey,
    pub pending: PendingCeremony,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
