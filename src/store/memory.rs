//! In-process token store.
//!
//! Each method holds the lock for its whole body, which is what makes `take`,
//! `replace` and `insert_unless_live` atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{RotationMark, StoreError, TokenKind, TokenRecord, TokenStore};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<Vec<u8>, TokenRecord>,
    rotations: HashMap<Vec<u8>, RotationMark>,
}

impl Tables {
    fn remove_if_kind(&mut self, kind: TokenKind, token_hash: &[u8]) -> Option<TokenRecord> {
        match self.records.get(token_hash) {
            Some(record) if record.kind == kind => self.records.remove(token_hash),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tables: Mutex<Tables>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, rotation marks excluded.
    pub async fn len(&self) -> usize {
        self.tables.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.lock().await.records.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, record: TokenRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.records.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict);
        }
        tables.records.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn take(
        &self,
        kind: TokenKind,
        token_hash: &[u8],
    ) -> Result<Option<TokenRecord>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.remove_if_kind(kind, token_hash))
    }

    async fn replace(
        &self,
        kind: TokenKind,
        old_hash: &[u8],
        replacement: TokenRecord,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.records.contains_key(&replacement.token_hash) {
            return Err(StoreError::Conflict);
        }
        let Some(old) = tables.remove_if_kind(kind, old_hash) else {
            return Ok(None);
        };
        tables
            .rotations
            .insert(old.token_hash.clone(), RotationMark::new(&old, &replacement));
        tables
            .records
            .insert(replacement.token_hash.clone(), replacement);
        Ok(Some(old))
    }

    async fn find(
        &self,
        kind: TokenKind,
        token_hash: &[u8],
    ) -> Result<Option<TokenRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .records
            .get(token_hash)
            .filter(|record| record.kind == kind)
            .cloned())
    }

    async fn find_rotation(
        &self,
        kind: TokenKind,
        old_hash: &[u8],
    ) -> Result<Option<RotationMark>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .rotations
            .get(old_hash)
            .filter(|mark| mark.kind == kind)
            .cloned())
    }

    async fn find_live_for_user(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        now: i64,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.kind == kind && !r.is_expired(now))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn insert_unless_live(&self, record: TokenRecord, now: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let outstanding = tables.records.values().any(|r| {
            r.user_id == record.user_id && r.kind == record.kind && !r.is_expired(now)
        });
        if outstanding {
            return Ok(false);
        }
        if tables.records.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict);
        }
        tables.records.insert(record.token_hash.clone(), record);
        Ok(true)
    }

    async fn delete_all_for_user(
        &self,
        user_id: Uuid,
        kind: Option<TokenKind>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let targeted =
            |owner: Uuid, of: TokenKind| owner == user_id && kind.map_or(true, |k| of == k);
        let before = tables.records.len();
        tables.records.retain(|_, r| !targeted(r.user_id, r.kind));
        let removed = before - tables.records.len();
        tables.rotations.retain(|_, m| !targeted(m.user_id, m.kind));
        Ok(removed as u64)
    }

    async fn records_for_user(
        &self,
        user_id: Uuid,
        kind: TokenKind,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<TokenRecord> = tables
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.kind == kind)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn purge_expired(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.records.len() + tables.rotations.len();
        tables.records.retain(|_, r| !r.is_expired(cutoff));
        tables.rotations.retain(|_, m| cutoff < m.expires_at);
        Ok((before - tables.records.len() - tables.rotations.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: TokenKind, hash: u8, user_id: Uuid, expires_at: i64) -> TokenRecord {
        TokenRecord::new(kind, vec![hash], user_id, 0, expires_at)
    }

    #[tokio::test]
    async fn take_removes_once() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();
        store.put(record(TokenKind::Refresh, 1, user, 100)).await?;

        assert!(store.take(TokenKind::Refresh, &[1]).await?.is_some());
        assert!(store.take(TokenKind::Refresh, &[1]).await?.is_none());
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn take_ignores_other_kind() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        store
            .put(record(TokenKind::PasswordReset, 1, Uuid::new_v4(), 100))
            .await?;

        assert!(store.take(TokenKind::EmailVerification, &[1]).await?.is_none());
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn put_rejects_duplicate_digest() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();
        store.put(record(TokenKind::Refresh, 1, user, 100)).await?;
        let result = store.put(record(TokenKind::Refresh, 1, user, 100)).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn replace_only_inserts_when_old_existed() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();

        let missing = store
            .replace(TokenKind::Refresh, &[1], record(TokenKind::Refresh, 2, user, 100))
            .await?;
        assert!(missing.is_none());
        assert!(store.is_empty().await);
        assert!(store.find_rotation(TokenKind::Refresh, &[1]).await?.is_none());

        store.put(record(TokenKind::Refresh, 1, user, 100)).await?;
        let old = store
            .replace(TokenKind::Refresh, &[1], record(TokenKind::Refresh, 2, user, 100))
            .await?;
        assert_eq!(old.map(|r| r.token_hash), Some(vec![1]));
        assert!(store.find(TokenKind::Refresh, &[2]).await?.is_some());
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn replace_leaves_a_rotation_mark() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();
        store.put(record(TokenKind::Refresh, 1, user, 100)).await?;
        let successor = TokenRecord::new(TokenKind::Refresh, vec![2], user, 30, 200);
        store.replace(TokenKind::Refresh, &[1], successor).await?;

        let mark = store
            .find_rotation(TokenKind::Refresh, &[1])
            .await?
            .ok_or(StoreError::Backend("no rotation mark".to_string()))?;
        assert_eq!(mark.successor_hash, vec![2]);
        assert_eq!(mark.rotated_at, 30);
        assert_eq!(mark.expires_at, 100);
        assert!(store.find_rotation(TokenKind::PasswordReset, &[1]).await?.is_none());

        // revoking the user drops the mark together with the records
        assert_eq!(store.delete_all_for_user(user, Some(TokenKind::Refresh)).await?, 1);
        assert!(store.find_rotation(TokenKind::Refresh, &[1]).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn find_live_for_user_skips_dead_and_foreign_records() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.put(record(TokenKind::PasswordReset, 1, user, 50)).await?;
        store.put(record(TokenKind::EmailVerification, 2, user, 90)).await?;
        store.put(record(TokenKind::PasswordReset, 3, other, 90)).await?;

        let live = store
            .find_live_for_user(user, TokenKind::PasswordReset, 49)
            .await?;
        assert_eq!(live.map(|r| r.token_hash), Some(vec![1]));

        // expiry is strict: expires_at == now is already dead
        assert!(store
            .find_live_for_user(user, TokenKind::PasswordReset, 50)
            .await?
            .is_none());

        // the verification token of the same user does not count as a reset token
        assert!(store
            .find_live_for_user(user, TokenKind::Refresh, 10)
            .await?
            .is_none());
        let verification = store
            .find_live_for_user(user, TokenKind::EmailVerification, 50)
            .await?;
        assert_eq!(verification.map(|r| r.token_hash), Some(vec![2]));
        Ok(())
    }

    #[tokio::test]
    async fn insert_unless_live_respects_expiry() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();

        assert!(
            store
                .insert_unless_live(record(TokenKind::PasswordReset, 1, user, 50), 10)
                .await?
        );
        assert!(
            !store
                .insert_unless_live(record(TokenKind::PasswordReset, 2, user, 90), 10)
                .await?
        );
        // a different kind is not blocked
        assert!(
            store
                .insert_unless_live(record(TokenKind::EmailVerification, 3, user, 90), 10)
                .await?
        );
        // once the first one is dead, a new one is accepted
        assert!(
            store
                .insert_unless_live(record(TokenKind::PasswordReset, 4, user, 120), 50)
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn delete_all_for_user_filters_by_kind() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.put(record(TokenKind::Refresh, 1, user, 100)).await?;
        store.put(record(TokenKind::Refresh, 2, user, 100)).await?;
        store.put(record(TokenKind::PasswordReset, 3, user, 100)).await?;
        store.put(record(TokenKind::Refresh, 4, other, 100)).await?;

        assert_eq!(
            store
                .delete_all_for_user(user, Some(TokenKind::Refresh))
                .await?,
            2
        );
        assert_eq!(store.records_for_user(user, TokenKind::PasswordReset).await?.len(), 1);
        assert_eq!(store.delete_all_for_user(user, None).await?, 1);
        assert_eq!(store.records_for_user(other, TokenKind::Refresh).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn purge_expired_keeps_live_rows() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();
        store.put(record(TokenKind::Refresh, 1, user, 10)).await?;
        store.put(record(TokenKind::Refresh, 2, user, 20)).await?;

        assert_eq!(store.purge_expired(10).await?, 1);
        assert!(store.find(TokenKind::Refresh, &[2]).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn purge_expired_drops_old_rotation_marks() -> Result<(), StoreError> {
        let store = MemoryTokenStore::new();
        let user = Uuid::new_v4();
        store.put(record(TokenKind::Refresh, 1, user, 10)).await?;
        store
            .replace(TokenKind::Refresh, &[1], record(TokenKind::Refresh, 2, user, 20))
            .await?;

        assert_eq!(store.purge_expired(9).await?, 0);
        assert!(store.find_rotation(TokenKind::Refresh, &[1]).await?.is_some());
        assert_eq!(store.purge_expired(10).await?, 1);
        assert!(store.find_rotation(TokenKind::Refresh, &[1]).await?.is_none());
        assert_eq!(store.len().await, 1);
        Ok(())
    }
}
