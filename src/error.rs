//! # Error Handling
//!
//! One error enum for the whole service, converted into HTTP responses at the
//! axum boundary.
//!
//! The ceremony kinds (`RegistrationNotFound`, `VerificationFailed`, ...) are
//! kept distinct internally so callers and tests can tell them apart, but the
//! response body never says which sub-check failed: the detail goes to the
//! log, the client gets a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// No live pending registration for this user id (missing, consumed or expired)
    #[error("Registration ceremony not found")]
    RegistrationNotFound,

    /// No live login challenge for this user id (missing, consumed or expired)
    #[error("Login challenge not found")]
    LoginChallengeNotFound,

    #[error("User not found")]
    UserNotFound,

    /// The user exists but has no passkey on file, or the response names a
    /// credential the user does not own
    #[error("Credential not found")]
    CredentialNotFound,

    /// A cryptographic or policy check failed: challenge, origin, RP id hash,
    /// flags, signature or counter. The string is for the log only.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Backing store unavailable or rejected the write
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session token could not be signed or decoded
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn verification(reason: impl Into<String>) -> Self {
        AppError::VerificationFailed(reason.into())
    }

    /// On a verify endpoint an unknown user or credential is a failed
    /// assertion like any other, not a lookup miss.
    pub fn on_verify(self) -> Self {
        match self {
            AppError::UserNotFound | AppError::CredentialNotFound => {
                AppError::VerificationFailed(self.to_string())
            }
            other => other,
        }
    }
}

/// Map each kind to a status code and a message that is safe to show.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::RegistrationNotFound | AppError::LoginChallengeNotFound => {
                tracing::info!("{}", self);
                (
                    StatusCode::BAD_REQUEST,
                    "Ceremony expired or not found, request new options".to_string(),
                )
            }
            // Same body for both so the endpoint does not reveal which emails exist
            AppError::UserNotFound | AppError::CredentialNotFound => {
                tracing::info!("{}", self);
                (StatusCode::NOT_FOUND, "Cannot authenticate".to_string())
            }
            AppError::VerificationFailed(reason) => {
                tracing::warn!("WebAuthn verification failed: {}", reason);
                (StatusCode::UNAUTHORIZED, "Authentication failed".to_string())
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error".to_string())
            }
            AppError::Token(e) => {
                tracing::error!("Token error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
