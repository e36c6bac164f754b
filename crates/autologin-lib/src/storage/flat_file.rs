// ============================
// crates/autologin-lib/src/storage/flat_file.rs
// ============================
//! Flat-file stores: one JSON document per store.
use super::{TokenRecord, TokenStore, UserStore};
use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use async_trait::async_trait;
use autologin_common::{UserId, UserRecord};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs as tokio_fs, sync::Mutex};
use tracing::debug;

/// Token store persisted as a JSON array of `TokenRecord`s.
///
/// All mutations go through one async mutex. Each one is applied to a copy
/// of the rows, written to a temp file that is renamed over the store, and
/// only then committed to memory, so a failed write leaves both the file and
/// the in-memory view untouched.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    rows: Arc<Mutex<Vec<TokenRecord>>>,
    clock: Arc<dyn Clock>,
}

impl FileTokenStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock<P: AsRef<Path>>(
        path: P,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio_fs::create_dir_all(parent).await.map_err(AuthError::store)?;
        }

        let rows = if path.exists() {
            let content = tokio_fs::read_to_string(&path)
                .await
                .map_err(AuthError::store)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).map_err(AuthError::store)?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), rows = rows.len(), "Opened token store");

        Ok(Self {
            path,
            rows: Arc::new(Mutex::new(rows)),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every persisted grant
    pub async fn records(&self) -> Vec<TokenRecord> {
        self.rows.lock().await.clone()
    }

    async fn persist(&self, rows: &[TokenRecord]) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(rows).map_err(AuthError::store)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio_fs::write(&tmp, json).await.map_err(AuthError::store)?;
        tokio_fs::rename(&tmp, &self.path)
            .await
            .map_err(AuthError::store)?;
        Ok(())
    }

    /// Run `change` against a copy of the rows and commit it once it is on disk.
    /// Nothing is written when `change` reports no modification.
    async fn mutate<T, F>(&self, change: F) -> Result<T, AuthError>
    where
        F: FnOnce(&mut Vec<TokenRecord>) -> (bool, T),
    {
        let mut rows = self.rows.lock().await;
        let mut next = rows.clone();
        let (changed, out) = change(&mut next);
        if changed {
            self.persist(&next).await?;
            *rows = next;
        }
        Ok(out)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn insert(&self, user: UserId, token_hash: &str) -> Result<(), AuthError> {
        let created_at = self.clock.now();
        self.mutate(|rows| {
            rows.push(TokenRecord {
                user_id: user,
                token_hash: token_hash.to_string(),
                created_at,
            });
            (true, ())
        })
        .await
    }

    async fn exists(&self, user: UserId, token_hash: &str) -> Result<bool, AuthError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .any(|r| r.user_id == user && r.token_hash == token_hash))
    }

    async fn update(
        &self,
        user: UserId,
        old_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AuthError> {
        let now = self.clock.now();
        self.mutate(|rows| {
            match rows
                .iter_mut()
                .find(|r| r.user_id == user && r.token_hash == old_hash)
            {
                Some(row) => {
                    row.token_hash = new_hash.to_string();
                    row.created_at = now;
                    (true, true)
                },
                None => (false, false),
            }
        })
        .await
    }

    async fn delete(&self, user: UserId, token_hash: &str) -> Result<(), AuthError> {
        self.mutate(|rows| {
            let before = rows.len();
            rows.retain(|r| !(r.user_id == user && r.token_hash == token_hash));
            (rows.len() != before, ())
        })
        .await
    }

    async fn purge(&self, user: UserId) -> Result<(), AuthError> {
        self.mutate(|rows| {
            let before = rows.len();
            rows.retain(|r| r.user_id != user);
            (rows.len() != before, ())
        })
        .await
    }

    async fn clean(&self, cutoff: DateTime<Utc>) -> Result<usize, AuthError> {
        self.mutate(|rows| {
            let before = rows.len();
            rows.retain(|r| r.created_at >= cutoff);
            let removed = before - rows.len();
            (removed > 0, removed)
        })
        .await
    }
}

/// Read-only user store loaded from a JSON array of `UserRecord`s
#[derive(Debug, Clone)]
pub struct FileUserStore {
    users: Arc<Vec<UserRecord>>,
}

impl FileUserStore {
    /// Load the user list; a missing file yields an empty store
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let users = if path.exists() {
            let content = tokio_fs::read_to_string(path)
                .await
                .map_err(AuthError::store)?;
            serde_json::from_str(&content).map_err(AuthError::store)?
        } else {
            debug!(path = %path.display(), "User file missing, starting empty");
            Vec::new()
        };
        Ok(Self {
            users: Arc::new(users),
        })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn get_by_id(&self, id: UserId) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_by_field(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.field_str(field) == Some(value))
            .cloned())
    }
}
