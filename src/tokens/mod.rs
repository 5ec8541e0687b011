//! Credential and session token lifecycle.

pub mod action;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod password;
pub mod random;
pub mod rotation;
pub mod session;

pub use action::{ActionKind, ActionTokenManager};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{SessionClaims, SessionTokenCodec, SignedToken};
pub use config::TokenConfig;
pub use error::AuthError;
pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use random::{hash_token, OsSecureRandom, SecureRandom};
pub use rotation::{RefreshRotationEngine, TokenPair};
pub use session::{ActionRequest, SessionService, SessionServiceBuilder};
