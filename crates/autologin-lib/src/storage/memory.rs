// ============================
// crates/autologin-lib/src/storage/memory.rs
// ============================
//! In-memory stores.
use super::{TokenRecord, TokenStore, UserStore};
use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use async_trait::async_trait;
use autologin_common::{UserId, UserRecord};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Token store backed by a `DashMap` of per-user grant tables.
///
/// A user's grants share one map entry, so `update` runs under that entry's
/// shard lock and cannot interleave with another `update` of the same row.
#[derive(Debug, Clone)]
pub struct MemoryTokenStore {
    rows: Arc<DashMap<UserId, HashMap<String, DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of live grants for `user`
    pub fn count_for(&self, user: UserId) -> usize {
        self.rows.get(&user).map_or(0, |rows| rows.len())
    }

    /// Total number of grants
    pub fn len(&self) -> usize {
        self.rows.iter().map(|rows| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every grant, ordered by user then creation time
    pub fn records(&self) -> Vec<TokenRecord> {
        let mut records: Vec<TokenRecord> = self
            .rows
            .iter()
            .flat_map(|entry| {
                let user_id = *entry.key();
                entry
                    .value()
                    .iter()
                    .map(|(hash, created_at)| TokenRecord {
                        user_id,
                        token_hash: hash.clone(),
                        created_at: *created_at,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        records.sort_by(|a, b| (a.user_id, a.created_at).cmp(&(b.user_id, b.created_at)));
        records
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, user: UserId, token_hash: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        self.rows
            .entry(user)
            .or_default()
            .insert(token_hash.to_string(), now);
        Ok(())
    }

    async fn exists(&self, user: UserId, token_hash: &str) -> Result<bool, AuthError> {
        Ok(self
            .rows
            .get(&user)
            .is_some_and(|rows| rows.contains_key(token_hash)))
    }

    async fn update(
        &self,
        user: UserId,
        old_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AuthError> {
        let now = self.clock.now();
        let Some(mut rows) = self.rows.get_mut(&user) else {
            return Ok(false);
        };
        if rows.remove(old_hash).is_none() {
            return Ok(false);
        }
        rows.insert(new_hash.to_string(), now);
        Ok(true)
    }

    async fn delete(&self, user: UserId, token_hash: &str) -> Result<(), AuthError> {
        if let Some(mut rows) = self.rows.get_mut(&user) {
            rows.remove(token_hash);
        }
        self.rows.remove_if(&user, |_, rows| rows.is_empty());
        Ok(())
    }

    async fn purge(&self, user: UserId) -> Result<(), AuthError> {
        self.rows.remove(&user);
        Ok(())
    }

    async fn clean(&self, cutoff: DateTime<Utc>) -> Result<usize, AuthError> {
        let mut removed = 0;
        self.rows.retain(|_, rows| {
            let before = rows.len();
            rows.retain(|_, created_at| *created_at >= cutoff);
            removed += before - rows.len();
            !rows.is_empty()
        });
        Ok(removed)
    }
}

/// User store held in memory, indexed by id
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<DashMap<UserId, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a user
    pub fn insert(&self, record: UserRecord) {
        self.users.insert(record.id, record);
    }

    pub fn remove(&self, id: UserId) {
        self.users.remove(&id);
    }

    /// Flip the activated flag, returning false when the user is unknown
    pub fn set_activated(&self, id: UserId, activated: bool) -> bool {
        match self.users.get_mut(&id) {
            Some(mut user) => {
                user.activated = activated;
                true
            },
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_id(&self, id: UserId) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn get_by_field(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self
            .users
            .iter()
            .find(|user| user.field_str(field) == Some(value))
            .map(|user| user.clone()))
    }
}
