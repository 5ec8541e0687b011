use thiserror::Error;

use crate::store::StoreError;

/// Typed outcome of every token operation.
///
/// Store and codec failures are folded into these variants so callers can match on
/// every branch, in particular the reuse and expiry paths that revoke sessions.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("refresh token reuse detected")]
    ReuseDetected,
    #[error("a token of this kind is already outstanding")]
    AlreadyOutstanding,
    #[error("unauthorized")]
    Unauthorized,
    #[error("token not found")]
    NotFound,
    #[error("token store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for failures that indicate a compromised or untrusted credential.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        matches!(self, Self::ReuseDetected)
    }

    /// True for failures the client caused; the rest are server-side.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Internal(_))
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
