//! In-memory capability implementations
//!
//! Reference implementations of the persistence and revocation
//! capabilities backed by process-local maps. They are what the test
//! suite runs against and what a single-instance embedding can ship
//! with; a multi-instance deployment supplies shared stores (such as
//! Redis behind `scan_prefix`) through the same traits.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use inkpot_core::{
    normalize_email, Author, AuthorRepository, PasswordResetToken, RepositoryError,
    ResetTokenRepository, Result, RevocationStore, StoreError, User, UserRepository,
    VerificationToken, VerificationTokenRepository,
};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

fn poisoned(what: &str) -> RepositoryError {
    RepositoryError::Database(format!("{what} lock poisoned"))
}

// ============================================================================
// Revocation Store
// ============================================================================

/// Process-local [`RevocationStore`].
///
/// Session keys live in a `RwLock<HashMap>`, so revocation is only
/// visible within this process. A fleet shares one store behind the same
/// trait instead.
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked session keys
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Unavailable("entries lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Unavailable("entries lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Unavailable("entries lock poisoned".to_string()))?;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ============================================================================
// User / Author Repositories
// ============================================================================

/// Process-local [`UserRepository`] enforcing email uniqueness on the
/// normalized address
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().map_err(|_| poisoned("users"))?;

        let email = normalize_email(&user.email);
        if users.values().any(|u| u.email == email) {
            return Err(RepositoryError::EmailAlreadyExists);
        }

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().map_err(|_| poisoned("users"))?;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().map_err(|_| poisoned("users"))?;
        let email = normalize_email(email);
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError> {
        let mut users = self.users.write().map_err(|_| poisoned("users"))?;
        let user = users.get_mut(&id).ok_or(RepositoryError::UserNotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut users = self.users.write().map_err(|_| poisoned("users"))?;
        let user = users.get_mut(&id).ok_or(RepositoryError::UserNotFound)?;
        user.is_verified = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut users = self.users.write().map_err(|_| poisoned("users"))?;
        users
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::UserNotFound)
    }
}

/// Process-local [`AuthorRepository`]
#[derive(Debug, Default)]
pub struct MemoryAuthorRepository {
    authors: RwLock<HashMap<Uuid, Author>>,
}

impl MemoryAuthorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorRepository for MemoryAuthorRepository {
    async fn create(&self, author: Author) -> Result<Author, RepositoryError> {
        let mut authors = self.authors.write().map_err(|_| poisoned("authors"))?;
        authors.insert(author.id, author.clone());
        Ok(author)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Author>, RepositoryError> {
        let authors = self.authors.read().map_err(|_| poisoned("authors"))?;
        Ok(authors.get(&id).cloned())
    }
}

// ============================================================================
// One-Time Token Repositories
// ============================================================================

/// Process-local [`VerificationTokenRepository`]
#[derive(Debug, Default)]
pub struct MemoryVerificationTokenRepository {
    records: RwLock<Vec<VerificationToken>>,
}

impl MemoryVerificationTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift every record's creation time backwards. Lets tests walk a
    /// stored token up to and past its validity window.
    pub fn age_records(&self, by: Duration) {
        if let Ok(mut records) = self.records.write() {
            for record in records.iter_mut() {
                record.created_at -= by;
            }
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VerificationTokenRepository for MemoryVerificationTokenRepository {
    async fn create(
        &self,
        record: VerificationToken,
    ) -> Result<VerificationToken, RepositoryError> {
        let mut records = self.records.write().map_err(|_| poisoned("records"))?;
        records.push(record.clone());
        Ok(record)
    }

    async fn find_by_token_and_email(
        &self,
        token: &str,
        email: &str,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        let records = self.records.read().map_err(|_| poisoned("records"))?;
        let email = normalize_email(email);
        Ok(records
            .iter()
            .find(|r| r.token == token && r.email == email)
            .cloned())
    }

    async fn delete_all_for_email(&self, email: &str) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().map_err(|_| poisoned("records"))?;
        let email = normalize_email(email);
        let before = records.len();
        records.retain(|r| r.email != email);
        Ok((before - records.len()) as u64)
    }
}

/// Process-local [`ResetTokenRepository`]
#[derive(Debug, Default)]
pub struct MemoryResetTokenRepository {
    records: RwLock<Vec<PasswordResetToken>>,
}

impl MemoryResetTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift every record's creation time backwards. Lets tests walk a
    /// stored token up to and past its validity window.
    pub fn age_records(&self, by: Duration) {
        if let Ok(mut records) = self.records.write() {
            for record in records.iter_mut() {
                record.created_at -= by;
            }
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResetTokenRepository for MemoryResetTokenRepository {
    async fn create(
        &self,
        record: PasswordResetToken,
    ) -> Result<PasswordResetToken, RepositoryError> {
        let mut records = self.records.write().map_err(|_| poisoned("records"))?;
        records.push(record.clone());
        Ok(record)
    }

    async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetToken>, RepositoryError> {
        let records = self.records.read().map_err(|_| poisoned("records"))?;
        Ok(records.iter().find(|r| r.token == token).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut records = self.records.write().map_err(|_| poisoned("records"))?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(RepositoryError::TokenNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkpot_core::{REVOKED_MARKER, VALID_MARKER};

    #[tokio::test]
    async fn test_revocation_store_set_get() {
        let store = MemoryRevocationStore::new();
        let key = "11111111-1111-1111-1111-111111111111:token";

        assert_eq!(store.get(key).await.unwrap(), None);

        store.set(key, VALID_MARKER).await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), Some(String::new()));

        store.set(key, REVOKED_MARKER).await.unwrap();
        assert_eq!(
            store.get(key).await.unwrap(),
            Some(REVOKED_MARKER.to_string())
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_revocation_store_scan_prefix() {
        let store = MemoryRevocationStore::new();
        store.set("user-a:t1", VALID_MARKER).await.unwrap();
        store.set("user-a:t2", VALID_MARKER).await.unwrap();
        store.set("user-b:t1", VALID_MARKER).await.unwrap();

        let mut keys = store.scan_prefix("user-a:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user-a:t1", "user-a:t2"]);

        assert!(store.scan_prefix("user-c:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_repository_email_uniqueness() {
        let repo = MemoryUserRepository::new();
        let author_id = Uuid::new_v4();

        repo.create(User::new("alice@blog.io", "hash1", author_id))
            .await
            .unwrap();

        // Case-variant duplicate resolves to the same normalized email
        let result = repo
            .create(User::new("Alice@Blog.IO", "hash2", author_id))
            .await;
        assert!(matches!(result, Err(RepositoryError::EmailAlreadyExists)));
    }

    #[tokio::test]
    async fn test_user_repository_lookup_and_updates() {
        let repo = MemoryUserRepository::new();
        let user = repo
            .create(User::new("bob@blog.io", "old-hash", Uuid::new_v4()))
            .await
            .unwrap();

        let found = repo.find_by_email("  BOB@blog.io ").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        repo.update_password(user.id, "new-hash").await.unwrap();
        repo.mark_verified(user.id).await.unwrap();

        let updated = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(updated.password_hash, "new-hash");
        assert!(updated.is_verified);

        repo.delete(user.id).await.unwrap();
        assert!(repo.find_by_id(user.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(user.id).await,
            Err(RepositoryError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_verification_tokens_delete_all_for_email() {
        let repo = MemoryVerificationTokenRepository::new();
        repo.create(VerificationToken::new("a@b.io", "t1"))
            .await
            .unwrap();
        repo.create(VerificationToken::new("a@b.io", "t2"))
            .await
            .unwrap();
        repo.create(VerificationToken::new("other@b.io", "t3"))
            .await
            .unwrap();

        let found = repo
            .find_by_token_and_email("t2", "A@B.io")
            .await
            .unwrap();
        assert!(found.is_some());

        let removed = repo.delete_all_for_email("a@b.io").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.len(), 1);
        assert!(repo
            .find_by_token_and_email("t1", "a@b.io")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reset_tokens_are_single_use() {
        let repo = MemoryResetTokenRepository::new();
        let record = repo
            .create(PasswordResetToken::new("a@b.io", "reset-1"))
            .await
            .unwrap();

        assert!(repo.find_by_token("reset-1").await.unwrap().is_some());

        repo.delete(record.id).await.unwrap();
        assert!(repo.find_by_token("reset-1").await.unwrap().is_none());
        assert!(matches!(
            repo.delete(record.id).await,
            Err(RepositoryError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_age_records_moves_creation_back() {
        let repo = MemoryVerificationTokenRepository::new();
        repo.create(VerificationToken::new("a@b.io", "t1"))
            .await
            .unwrap();

        repo.age_records(Duration::minutes(61));

        let record = repo
            .find_by_token_and_email("t1", "a@b.io")
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_expired(Duration::minutes(60)));
    }
}
