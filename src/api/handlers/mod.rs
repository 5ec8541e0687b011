//! API handlers and the helpers they share.

pub mod health;
pub mod password;
pub mod session;
pub mod types;
pub mod utils;
pub mod verification;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;
use uuid::Uuid;

use crate::tokens::{AuthError, SessionService};

/// Every single-use link failure looks the same to the client.
pub const INVALID_LINK_MESSAGE: &str = "Invalid or expired link";

/// User id of a valid bearer access token, if one was sent.
pub(crate) fn bearer_user(headers: &HeaderMap, sessions: &SessionService) -> Option<Uuid> {
    let token = utils::extract_bearer_token(headers)?;
    let claims = sessions.authenticate(&token).ok()?;
    Uuid::parse_str(&claims.sub).ok()
}

/// Map a consume/peek failure: client errors collapse into one generic message.
pub(crate) fn link_failure(err: &AuthError, action: &str) -> Response {
    if err.is_client_error() {
        (StatusCode::BAD_REQUEST, INVALID_LINK_MESSAGE.to_string()).into_response()
    } else {
        error!("{action} failed: {err}");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{action} failed")).into_response()
    }
}
