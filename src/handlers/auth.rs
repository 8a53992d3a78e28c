use crate::error::{AppError, AppResult};
use crate::middleware::auth::session_token;
use crate::session::expiry_of;
use crate::state::AppState;
use crate::webauthn::coordinator::CeremonyOutcome;
use crate::webauthn::types::*;
use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};

// Registration endpoints

pub async fn register_options(
    State(state): State<AppState>,
    Json(req): Json<RegistrationOptionsRequest>,
) -> AppResult<Json<CeremonyStart<CreationOptions>>> {
    let start = state
        .coordinator
        .begin_registration(&req.name, &req.email)
        .await?;

    Ok(Json(start))
}

pub async fn register_verify(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegistrationVerifyRequest>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let outcome = state
        .coordinator
        .finish_registration(&req.user_id, &req.attestation_response)
        .await?;

    Ok(signed_in(&state, jar, outcome))
}

// Login endpoints

pub async fn login_options(
    State(state): State<AppState>,
    Json(req): Json<LoginOptionsRequest>,
) -> AppResult<Json<CeremonyStart<RequestOptions>>> {
    let start = state.coordinator.begin_login(&req.email).await?;

    Ok(Json(start))
}

pub async fn login_verify(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginVerifyRequest>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let outcome = state
        .coordinator
        .finish_login(&req.user_id, &req.assertion_response)
        .await
        .map_err(AppError::on_verify)?;

    Ok(signed_in(&state, jar, outcome))
}

fn signed_in(state: &AppState, jar: CookieJar, outcome: CeremonyOutcome) -> (CookieJar, Json<Value>) {
    let cookie = state.sessions.cookie(&outcome.session);
    (
        jar.add(cookie),
        Json(json!({
            "verified": true,
            "userId": outcome.user.id,
        })),
    )
}

// Session endpoints

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    (
        jar.remove(state.sessions.removal_cookie()),
        Json(json!({
            "success": true,
            "message": "Logged out successfully"
        })),
    )
}

pub async fn session_info(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let claims = session_token(&headers).and_then(|token| state.sessions.verify(&token).ok());

    match claims {
        Some(claims) => Json(json!({
            "authenticated": true,
            "userId": claims.sub,
            "expiresAt": expiry_of(&claims),
        })),
        None => Json(json!({
            "authenticated": false
        })),
    }
}
