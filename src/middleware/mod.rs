//! # Middleware Module
//!
//! ## Our Middleware
//! - `auth`: rejects requests without a valid session token and exposes the
//!   signed-in user to the handler as a `CurrentUser` extension

pub mod auth;
