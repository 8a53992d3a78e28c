//! # Configuration Management
//!
//! Configuration comes from the environment ("12-factor" style), with an
//! optional `.env` file for local development. The result is a set of plain
//! structs that are handed to constructors explicitly; nothing below the
//! binary reads the environment.
//!
//! ## Environment Variables
//! - `HOST`, `PORT`: server bind address (default `127.0.0.1:8080`)
//! - `DATABASE_URL`: SQLite connection string
//! - `RP_ORIGIN`: full origin the browser reports (e.g. `https://shop.example.com`)
//! - `RP_ID`: relying party id; defaults to the hostname of `RP_ORIGIN`
//! - `RP_NAME`: human-readable service name shown by the authenticator
//! - `CEREMONY_TIMEOUT_MS`: timeout hint sent in the options payloads
//! - `CHALLENGE_TTL_SECS`: lifetime of a pending ceremony (default 300)
//! - `REQUIRE_USER_VERIFICATION`: reject responses without the UV flag
//! - `COUNTER_POLICY`: `lenient` (default) or `strict`
//! - `AUTHENTICATOR_ATTACHMENT`: `platform` or `cross-platform`; unset allows both
//! - `SESSION_SECRET`, `SESSION_PREVIOUS_SECRETS`: JWT signing secrets
//! - `SESSION_TTL_DAYS`: session lifetime (default 7)
//! - `COOKIE_SECURE`: set the `Secure` attribute on the session cookie

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use std::env;
use std::str::FromStr;
use url::Url;

use crate::webauthn::types::AuthenticatorAttachment;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    pub host: String,

    /// Server port number
    pub port: u16,

    /// SQLite database connection URL, e.g. `sqlite:passkey_gate.db?mode=rwc`
    pub database_url: String,

    /// Relying party and ceremony settings
    pub webauthn: WebauthnConfig,

    /// Session token settings
    pub session: SessionConfig,
}

/// Relying party identity and ceremony policy.
///
/// The origin is what the browser writes into `clientDataJSON`; the RP id is
/// the hostname the credential is scoped to and whose SHA-256 appears in the
/// authenticator data.
#[derive(Debug, Clone)]
pub struct WebauthnConfig {
    pub rp_id: String,
    pub rp_origin: String,
    pub rp_name: String,
    /// Timeout hint (milliseconds) sent to the browser
    pub timeout_ms: u64,
    /// How long a pending ceremony stays valid
    pub challenge_ttl: Duration,
    /// Reject responses whose authenticator data lacks the UV flag
    pub require_user_verification: bool,
    pub counter_policy: CounterPolicy,
    /// Restrict registration to one kind of authenticator; `None` accepts
    /// platform and roaming keys alike
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
}

/// How strictly the authenticator signature counter is enforced.
///
/// Some authenticators (most synced passkeys) never increment their counter
/// and always report zero. `Lenient` accepts a zero counter as long as the
/// stored counter is also zero; `Strict` requires every login to report a
/// counter strictly greater than the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterPolicy {
    #[default]
    Lenient,
    Strict,
}

impl CounterPolicy {
    /// Whether a login reporting `reported` is acceptable for a credential
    /// whose stored counter is `stored`.
    pub fn accepts(self, stored: u32, reported: u32) -> bool {
        if reported > stored {
            return true;
        }
        match self {
            CounterPolicy::Lenient => stored == 0 && reported == 0,
            CounterPolicy::Strict => false,
        }
    }

    /// Whether an unchanged zero counter may be written back.
    pub fn allows_zero_counter(self) -> bool {
        self == CounterPolicy::Lenient
    }
}

impl FromStr for CounterPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(CounterPolicy::Lenient),
            "strict" => Ok(CounterPolicy::Strict),
            other => Err(anyhow!("unknown counter policy '{}'", other)),
        }
    }
}

/// Session token signing and cookie settings.
#[derive(Clone)]
pub struct SessionConfig {
    /// Current HS256 signing secret
    pub secret: String,
    /// Secrets still accepted for verification after a rotation
    pub previous_secrets: Vec<String>,
    pub ttl: Duration,
    pub cookie_secure: bool,
}

// Secrets stay out of the startup log line.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("previous_secrets", &self.previous_secrets.len())
            .field("ttl", &self.ttl)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl WebauthnConfig {
    /// Build relying party settings from an origin, deriving the RP id from
    /// the origin's hostname when none is given.
    pub fn for_origin(rp_origin: &str, rp_id: Option<&str>, rp_name: &str) -> Result<Self> {
        let rp_origin = rp_origin.trim().trim_end_matches('/').to_string();
        let rp_id = match rp_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => hostname_of(&rp_origin)?,
        };

        Ok(Self {
            rp_id,
            rp_origin,
            rp_name: rp_name.to_string(),
            timeout_ms: 60_000,
            challenge_ttl: Duration::seconds(300),
            require_user_verification: true,
            counter_policy: CounterPolicy::default(),
            authenticator_attachment: None,
        })
    }
}

/// Extract the hostname of a URL such as `https://shop.example.com:8443`.
pub fn hostname_of(origin: &str) -> Result<String> {
    let url = Url::parse(origin).with_context(|| format!("invalid RP_ORIGIN '{}'", origin))?;
    url.host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| anyhow!("RP_ORIGIN '{}' has no host", origin))
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:passkey_gate.db?mode=rwc
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=Storefront
    /// SESSION_SECRET=change-me
    /// COOKIE_SECURE=false
    /// ```
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let rp_origin = env::var("RP_ORIGIN").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let rp_id = env::var("RP_ID").ok();
        let rp_name = env::var("RP_NAME").unwrap_or_else(|_| "Storefront".to_string());

        let mut webauthn = WebauthnConfig::for_origin(&rp_origin, rp_id.as_deref(), &rp_name)?;
        webauthn.timeout_ms = parse_var("CEREMONY_TIMEOUT_MS", 60_000)?;
        webauthn.challenge_ttl = Duration::seconds(parse_var("CHALLENGE_TTL_SECS", 300)?);
        webauthn.require_user_verification = parse_var("REQUIRE_USER_VERIFICATION", true)?;
        webauthn.counter_policy = parse_var("COUNTER_POLICY", CounterPolicy::Lenient)?;
        webauthn.authenticator_attachment = match env::var("AUTHENTICATOR_ATTACHMENT") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.parse()
                    .map_err(|e| anyhow!("invalid value for AUTHENTICATOR_ATTACHMENT: {}", e))?,
            ),
            _ => None,
        };

        let session = SessionConfig {
            secret: session_secret()?,
            previous_secrets: env::var("SESSION_PREVIOUS_SECRETS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty())
                        .map(|s| s.to_string())
                        .collect()
                })
                .unwrap_or_default(),
            ttl: Duration::days(parse_var("SESSION_TTL_DAYS", 7)?),
            cookie_secure: parse_var("COOKIE_SECURE", true)?,
        };

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:passkey_gate.db?mode=rwc".to_string()),
            webauthn,
            session,
        })
    }

    /// Socket address for `tokio::net::TcpListener::bind()`, e.g. "127.0.0.1:8080"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value for {}: {}", name, e)),
        _ => Ok(default),
    }
}

/// Release builds refuse to start without a configured secret. Debug builds
/// fall back to a random per-process secret, so sessions do not survive a
/// restart.
fn session_secret() -> Result<String> {
    match env::var("SESSION_SECRET") {
        Ok(secret) if !secret.trim().is_empty() => Ok(secret),
        _ if cfg!(debug_assertions) => {
            tracing::warn!("SESSION_SECRET not set, using an ephemeral secret");
            Ok(format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4()))
        }
        _ => Err(anyhow!("SESSION_SECRET must be set")),
    }
}
