//! User collaborator: the token core only reads users and triggers two side
//! effects on them (mark email verified, replace password hash).

use async_trait::async_trait;
use uuid::Uuid;

use crate::store::StoreError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryUserDirectory;
pub use postgres::PgUserDirectory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Lookup by normalized (trimmed, lowercase) email.
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Returns false when the user does not exist.
    async fn mark_email_verified(&self, user_id: Uuid) -> Result<bool, StoreError>;

    /// Returns false when the user does not exist.
    async fn set_password_hash(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError>;
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }
}
