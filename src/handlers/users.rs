//! # User Handlers
//!
//! Currently only the profile of the signed-in user.

use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;
use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

/// Get the current user's profile
///
/// ## Route
/// GET /api/users/me
///
/// ## Authentication
/// Requires a session (protected by the `require_auth` middleware, which
/// supplies `CurrentUser`)
///
/// ## Response
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "Ada Lovelace",
///   "email": "ada@example.com",
///   "emailVerified": false,
///   "loginType": "passkey",
///   "createdAt": "2024-06-01T10:30:00+00:00"
/// }
/// ```
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<Value>> {
    // A valid token for a user that no longer exists is still a dead session
    let user = state
        .users
        .find_by_id(&current_user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    Ok(Json(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "emailVerified": user.email_verified,
        "loginType": user.login_type,
        "createdAt": user.created_at
    })))
}
