//! # passkey_gate
//!
//! Passwordless authentication for the storefront backend: WebAuthn
//! (passkey) registration and login ceremonies, credential storage with
//! anti-replay counters, and stateless signed session tokens.
//!
//! ## Key Concepts
//! - **Ceremony**: the two round trips of a registration or login
//!   (options, then verify)
//! - **Challenge**: single-use random bytes that bind a response to one ceremony
//! - **Counter**: the authenticator's signature count, used to spot cloned keys
//!
//! The binary in `main.rs` only loads configuration and serves `router()`.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod session;
pub mod state;
pub mod webauthn;

#[cfg(test)]
mod tests;

use crate::handlers::auth::*;
use crate::handlers::health::health_check;
use crate::handlers::users::get_current_user;
use crate::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

/// All routes, with state attached. Cross-cutting layers (CORS, tracing) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    // Routes that require a valid session
    let protected_routes = Router::new()
        .route("/api/users/me", get(get_current_user))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        // Registration (creating a passkey account)
        .route("/api/auth/register/options", post(register_options))
        .route("/api/auth/register/verify", post(register_verify))
        // Login
        .route("/api/auth/login/options", post(login_options))
        .route("/api/auth/login/verify", post(login_verify))
        // Session management
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session_info))
        .merge(protected_routes)
        .with_state(state)
}
