//! Login, refresh and logout.
//!
//! The access token is returned in the body; the refresh token only ever
//! travels in the `HttpOnly` cookie. Every refresh failure clears that cookie.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::bearer_user;
use super::types::{LoginRequest, RefreshRequest, SessionResponse};
use super::utils::{clear_refresh_cookie, extract_refresh_token, refresh_cookie, valid_email};
use crate::api::AppState;
use crate::tokens::{AuthError, TokenConfig, TokenPair};
use crate::users::normalize_email;

fn session_response(config: &TokenConfig, pair: TokenPair) -> Response {
    let mut headers = HeaderMap::new();
    match refresh_cookie(config, &pair.refresh_token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build refresh cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    let body = SessionResponse {
        user_id: pair.user_id.to_string(),
        access_token: pair.access_token,
        token_type: "Bearer".to_string(),
        expires_at: pair.access_expires_at,
    };
    (StatusCode::OK, headers, Json(body)).into_response()
}

fn cleared(config: &TokenConfig, status: StatusCode, message: &str) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(config) {
        headers.insert(SET_COOKIE, cookie);
    }
    (status, headers, message.to_string()).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started, refresh cookie set", body = SessionResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 401, description = "Invalid credentials", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid email or password".to_string()).into_response();
    }

    let sessions = state.sessions();
    match sessions.login_with_password(&email, &request.password).await {
        Ok(pair) => session_response(sessions.config(), pair),
        Err(AuthError::Unauthorized) => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
        }
        Err(err) => {
            error!("Login failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated, new refresh cookie set", body = SessionResponse),
        (status = 400, description = "Invalid input", body = String),
        (status = 401, description = "Refresh rejected, session ended", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let sessions = state.sessions();
    let config = sessions.config();

    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let Ok(user_id) = Uuid::parse_str(request.user_id.trim()) else {
        return (StatusCode::BAD_REQUEST, "Invalid user id".to_string()).into_response();
    };
    let Some(presented) = extract_refresh_token(&headers) else {
        return cleared(config, StatusCode::UNAUTHORIZED, "Missing refresh token");
    };

    match sessions.refresh(&presented, user_id).await {
        Ok(pair) => session_response(config, pair),
        Err(err) if err.is_client_error() => {
            if err.is_security_event() {
                warn!(user_id = %user_id, "Refresh rejected: {err}");
            }
            cleared(config, StatusCode::UNAUTHORIZED, "Session expired")
        }
        Err(err) => {
            error!("Refresh failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Refresh failed".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.sessions();
    let presented = extract_refresh_token(&headers);

    // Ending every session of a user needs a valid access token; the cookie
    // alone only revokes itself.
    match bearer_user(&headers, sessions) {
        Some(user_id) => sessions.logout(user_id, presented.as_deref()).await,
        None => {
            if let Some(presented) = presented.as_deref() {
                sessions.end_refresh(presented).await;
            }
        }
    }

    // Always clear the cookie, even if the refresh record was missing.
    cleared(sessions.config(), StatusCode::NO_CONTENT, "")
}
