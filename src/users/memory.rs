use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{normalize_email, User, UserDirectory};
use crate::store::StoreError;

/// In-process user directory for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user; the email is normalized before it is stored.
    ///
    /// # Errors
    /// `Conflict` if the id or the email is already taken.
    pub async fn insert(&self, mut user: User) -> Result<(), StoreError> {
        user.email = normalize_email(&user.email);
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) || users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict);
        }
        users.insert(user.id, user);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&user_id).map_or(false, |user| {
            user.email_verified = true;
            true
        }))
    }

    async fn set_password_hash(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&user_id).map_or(false, |user| {
            user.password_hash = hash.to_string();
            true
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            email_verified: false,
        }
    }

    #[tokio::test]
    async fn lookup_by_normalized_email() -> Result<(), StoreError> {
        let directory = MemoryUserDirectory::new();
        let alice = user("Alice@Example.com");
        directory.insert(alice.clone()).await?;

        let found = directory.get_by_email(" alice@example.COM ").await?;
        assert_eq!(found.map(|u| u.id), Some(alice.id));
        Ok(())
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email() -> Result<(), StoreError> {
        let directory = MemoryUserDirectory::new();
        directory.insert(user("a@example.com")).await?;
        let result = directory.insert(user("A@example.com")).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn side_effects_report_missing_users() -> Result<(), StoreError> {
        let directory = MemoryUserDirectory::new();
        let alice = user("a@example.com");
        directory.insert(alice.clone()).await?;

        assert!(directory.mark_email_verified(alice.id).await?);
        assert!(directory.set_password_hash(alice.id, "new").await?);
        let stored = directory.get_by_id(alice.id).await?;
        assert_eq!(
            stored.map(|u| (u.email_verified, u.password_hash)),
            Some((true, "new".to_string()))
        );

        assert!(!directory.mark_email_verified(Uuid::new_v4()).await?);
        assert!(!directory.set_password_hash(Uuid::new_v4(), "x").await?);
        Ok(())
    }
}
