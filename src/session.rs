//! # Session Tokens
//!
//! A successful ceremony ends with a signed HS256 JWT carrying the user id.
//! Nothing is stored server-side: a token is valid while its signature checks
//! out and its `exp` lies ahead of the clock. Revocation is by rotating
//! `SESSION_SECRET`; the old value can stay in `SESSION_PREVIOUS_SECRETS` for
//! a grace period.

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{AppError, AppResult};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed token and when it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionIssuer {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Sign a token for `user_id` with the configured lifetime.
    pub fn issue(&self, user_id: &str) -> AppResult<IssuedSession> {
        self.issue_with_ttl(user_id, self.config.ttl)
    }

    pub fn issue_with_ttl(&self, user_id: &str, ttl: Duration) -> AppResult<IssuedSession> {
        let now = self.clock.now();
        let expires_at = now + ttl;

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )?;

        Ok(IssuedSession {
            user_id: claims.sub,
            token,
            expires_at,
        })
    }

    /// Check the signature against the current secret, then any previous
    /// ones, and the expiry against the injected clock.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // jsonwebtoken compares against the wall clock; expiry is checked below
        validation.validate_exp = false;

        let secrets = std::iter::once(self.config.secret.as_str())
            .chain(self.config.previous_secrets.iter().map(|s| s.as_str()));

        for secret in secrets {
            if let Ok(data) = decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &validation,
            ) {
                let claims = data.claims;
                if claims.exp <= self.clock.now().timestamp() {
                    return Err(AppError::Unauthorized("Session expired".to_string()));
                }
                return Ok(claims);
            }
        }

        Err(AppError::Unauthorized("Invalid token".to_string()))
    }

    /// The `Set-Cookie` carrying an issued token.
    pub fn cookie(&self, session: &IssuedSession) -> Cookie<'static> {
        let max_age = (session.expires_at - self.clock.now()).num_seconds().max(0);

        Cookie::build((SESSION_COOKIE, session.token.clone()))
            .http_only(true)
            .secure(self.config.cookie_secure)
            .same_site(SameSite::None)
            .path("/")
            .max_age(time::Duration::seconds(max_age))
            .build()
    }

    /// A cookie matching the session cookie's name and path, for
    /// `CookieJar::remove`.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .http_only(true)
            .secure(self.config.cookie_secure)
            .same_site(SameSite::None)
            .path("/")
            .build()
    }
}

/// When a claim set stops being valid, for display.
pub fn expiry_of(claims: &Claims) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(claims.exp, 0).single()
}
