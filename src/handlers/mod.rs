//! # HTTP Request Handlers
//!
//! ## Submodules
//! - `health`: health check endpoint (for monitoring)
//! - `auth`: the four ceremony endpoints plus logout and session info
//! - `users`: the signed-in user's profile
//!
//! Handlers stay thin: extract the body, call the `CeremonyCoordinator`, turn
//! the outcome into JSON and a cookie. `AppError` does the error mapping.

pub mod auth;
pub mod health;
pub mod users;
