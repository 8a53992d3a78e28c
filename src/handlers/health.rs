//! # Health Check Handler
//!
//! Used by load balancers and monitoring systems.

use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Health check endpoint
///
/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// {
///   "status": "healthy",
///   "service": "passkey_gate",
///   "rpId": "shop.example.com",
///   "database": "ok"
/// }
/// ```
///
/// Always 200 while the process is up; a failing database shows as
/// `"database": "unavailable"` rather than an error status.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Health check database probe failed: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "status": "healthy",
        "service": "passkey_gate",
        "rpId": state.config.webauthn.rp_id,
        "database": database
    }))
}
