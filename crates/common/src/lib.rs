// ================
// common/src/lib.rs
// ================
//! Common types shared by the autologin library, its binary and the test suite.
//! This module defines the user, session and cookie payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Profile keys that must never reach a cached session snapshot
pub const SENSITIVE_FIELDS: &[&str] = &["password", "password_hash"];

/// Primary key of a user record
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// A user row as held by the user store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Primary key
    pub id: UserId,
    /// PHC-formatted password hash
    pub password_hash: String,
    /// Whether the account may log in
    #[serde(default)]
    pub activated: bool,
    /// Identification field and any other profile data
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UserRecord {
    /// Create an activated record with no profile fields
    pub fn new(id: i64, password_hash: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            password_hash: password_hash.into(),
            activated: true,
            fields: Map::new(),
        }
    }

    /// Builder-style helper for setting a profile field
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Builder-style helper for the activated flag
    pub fn activated(mut self, activated: bool) -> Self {
        self.activated = activated;
        self
    }

    /// Look up a profile field as a string
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Drop the password hash and any password-like profile field.
    pub fn into_session_user(self) -> SessionUser {
        let mut fields = self.fields;
        for key in SENSITIVE_FIELDS {
            fields.remove(*key);
        }
        SessionUser {
            id: self.id,
            activated: self.activated,
            fields,
        }
    }
}

/// The part of a user record that is safe to cache in a session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub id: UserId,
    pub activated: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SessionUser {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Per-agent authentication state
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub logged_in: bool,
    pub user: Option<SessionUser>,
}

impl SessionSnapshot {
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn logged_in(user: SessionUser) -> Self {
        Self {
            logged_in: true,
            user: Some(user),
        }
    }

    /// The cached user, only while logged in
    pub fn user(&self) -> Option<&SessionUser> {
        if self.logged_in {
            self.user.as_ref()
        } else {
            None
        }
    }
}

/// Contents of the remember-me cookie.
///
/// `key` is the plaintext token; the server only ever stores its digest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CookiePayload {
    pub id: UserId,
    pub key: String,
}
