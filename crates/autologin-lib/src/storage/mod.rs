// ============================
// crates/autologin-lib/src/storage/mod.rs
// ============================
//! Storage abstractions for remember-me tokens and user records.
pub mod flat_file;
pub mod memory;

use crate::error::AuthError;
use async_trait::async_trait;
use autologin_common::{UserId, UserRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use flat_file::{FileTokenStore, FileUserStore};
pub use memory::{MemoryTokenStore, MemoryUserStore};

/// One remember-me grant as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: UserId,
    /// Digest of the plaintext token, never the token itself
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent store of hashed remember-me tokens.
///
/// Every operation is keyed by user id and/or token digest. Deletions are
/// idempotent.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Add a grant for `user`
    async fn insert(&self, user: UserId, token_hash: &str) -> Result<(), AuthError>;

    async fn exists(&self, user: UserId, token_hash: &str) -> Result<bool, AuthError>;

    /// Replace `old_hash` with `new_hash` in one step.
    ///
    /// Returns `Ok(false)` without writing anything when no row matches
    /// `(user, old_hash)`, so a replayed or already rotated token can never
    /// be resurrected.
    async fn update(&self, user: UserId, old_hash: &str, new_hash: &str)
        -> Result<bool, AuthError>;

    async fn delete(&self, user: UserId, token_hash: &str) -> Result<(), AuthError>;

    /// Delete every grant held by `user`
    async fn purge(&self, user: UserId) -> Result<(), AuthError>;

    /// Delete grants created strictly before `cutoff`, returning how many went
    async fn clean(&self, cutoff: DateTime<Utc>) -> Result<usize, AuthError>;
}

/// Read access to user records
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: UserId) -> Result<Option<UserRecord>, AuthError>;

    /// Look a user up by a profile field such as `username` or `email`
    async fn get_by_field(&self, field: &str, value: &str)
        -> Result<Option<UserRecord>, AuthError>;
}
