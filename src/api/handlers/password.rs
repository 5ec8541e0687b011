//! Password reset endpoints.
//!
//! The request endpoint answers 204 whether or not the email belongs to an
//! account, and whether or not a link is already outstanding.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::{debug, error};

use super::link_failure;
use super::types::{PasswordResetCheckRequest, PasswordResetConfirmRequest, PasswordResetRequest};
use super::utils::{valid_email, valid_password, MIN_PASSWORD_LENGTH};
use crate::api::{email::EmailMessage, AppState};
use crate::tokens::AuthError;
use crate::users::normalize_email;

#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 204, description = "If the account exists, a reset link was sent"),
        (status = 400, description = "Invalid email", body = String)
    ),
    tag = "auth"
)]
pub async fn request_reset(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let sessions = state.sessions();
    match sessions.reset_password_request(&email).await {
        Ok(Some(request)) => {
            let url = sessions.config().build_reset_url(&request.token);
            let message = EmailMessage::password_reset(&request.email, &url);
            if let Err(err) = state.email().send(&message) {
                error!("Failed to send password reset email: {err}");
            }
        }
        Ok(None) => debug!("Password reset requested for unknown email"),
        Err(AuthError::AlreadyOutstanding) => {
            debug!("Password reset already outstanding");
        }
        Err(err) => {
            error!("Password reset request failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset request failed".to_string(),
            )
                .into_response();
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Check a reset link before showing the new-password form.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/check",
    request_body = PasswordResetCheckRequest,
    responses(
        (status = 204, description = "Link is valid"),
        (status = 400, description = "Invalid or expired link", body = String)
    ),
    tag = "auth"
)]
pub async fn check_reset(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<PasswordResetCheckRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetCheckRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    match state.sessions().reset_password_peek(token).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => link_failure(&err, "Password reset check"),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 204, description = "Password changed, all sessions ended"),
        (status = 400, description = "Invalid or expired link, or weak password", body = String)
    ),
    tag = "auth"
)]
pub async fn confirm_reset(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<PasswordResetConfirmRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetConfirmRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }
    // Checked before consuming so a weak password does not burn the link.
    if !valid_password(&request.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        )
            .into_response();
    }

    match state
        .sessions()
        .reset_password_consume(token, &request.new_password)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => link_failure(&err, "Password reset"),
    }
}
