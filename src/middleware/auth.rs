use crate::error::AppError;
use crate::session::SESSION_COOKIE;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

/// The signed-in user, inserted as a request extension by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

/// The session token from the `session` cookie, or failing that from an
/// `Authorization: Bearer` header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Reject requests without a valid session token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let claims = state.sessions.verify(&token)?;

    request.extensions_mut().insert(CurrentUser { id: claims.sub });
    Ok(next.run(request).await)
}
