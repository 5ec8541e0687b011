//! Email verification endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::types::VerifyEmailRequest;
use super::{bearer_user, link_failure};
use crate::api::{email::EmailMessage, AppState};
use crate::tokens::AuthError;

/// Send a verification link to the signed-in user.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email/request",
    responses(
        (status = 204, description = "Verification email sent, or email already verified"),
        (status = 401, description = "Missing or invalid access token", body = String),
        (status = 429, description = "A verification link is already outstanding", body = String)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn request_verification(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let sessions = state.sessions();
    let Some(user_id) = bearer_user(&headers, sessions) else {
        return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
    };

    match sessions.verify_email_request(user_id).await {
        Ok(Some(request)) => {
            let url = sessions.config().build_verify_url(&request.token);
            let message = EmailMessage::verify_email(&request.email, &url);
            if let Err(err) = state.email().send(&message) {
                error!("Failed to send verification email: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to send email".to_string(),
                )
                    .into_response();
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(AuthError::AlreadyOutstanding) => (
            StatusCode::TOO_MANY_REQUESTS,
            "A verification link was already sent".to_string(),
        )
            .into_response(),
        Err(AuthError::NotFound) => {
            (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
        }
        Err(err) => {
            error!("Verification request failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification request failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Verify the email link by consuming the single-use token.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid or expired link", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    match state.sessions().verify_email_consume(token).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => link_failure(&err, "Verification"),
    }
}
