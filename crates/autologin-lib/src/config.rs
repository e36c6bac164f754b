// ============================
// crates/autologin-lib/src/config.rs
// ============================
//! Configuration management.
use crate::auth::{HashAlgorithm, PasswordAlgorithm};
use crate::error::AuthError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable prefix, sections separated by `__`
pub const ENV_PREFIX: &str = "AUTOLOGIN_";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Minimum token entropy accepted by `validate`
const MIN_TOKEN_BYTES: usize = 16;

/// Longest remember-me lifetime accepted by `validate` (10 years)
pub const MAX_COOKIE_AGE_SECS: u64 = 60 * 60 * 24 * 365 * 10;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub cookie: CookieSettings,
    pub token: TokenSettings,
    pub password: PasswordSettings,
    pub session: SessionSettings,
    /// User field matched against the login identification
    pub identification: String,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub path: PathBuf,
}

/// Remember-me cookie settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub name: String,
    /// Lifetime of the cookie and of the stored token rows
    pub max_age_secs: u64,
    /// Encrypt the cookie payload with AES-256-GCM
    pub encrypt: bool,
    /// Base64 encoded 32-byte key; when unset `<storage>/cookie_key` is used
    pub encryption_key: Option<String>,
    pub secure: bool,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    pub hash_algorithm: HashAlgorithm,
    /// Random bytes per token
    pub bytes: usize,
    /// Drop the user's other remember grants on explicit login
    pub purge_on_login: bool,
    /// Sweep expired rows before issuing a grant
    pub clean_on_login: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub algorithm: PasswordAlgorithm,
}

/// Server-side session backend timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub absolute_ttl_secs: u64,
    pub idle_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            cookie: CookieSettings::default(),
            token: TokenSettings::default(),
            password: PasswordSettings::default(),
            session: SessionSettings::default(),
            identification: "username".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            json_logs: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "autologin".to_string(),
            max_age_secs: 60 * 60 * 24 * 60, // 60 days
            encrypt: true,
            encryption_key: None,
            secure: false,
            path: "/".to_string(),
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            bytes: 32,
            purge_on_login: true,
            clean_on_login: true,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            absolute_ttl_secs: 60 * 60 * 24,
            idle_ttl_secs: 60 * 60 * 2,
        }
    }
}

impl CookieSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Decode the configured key, if any
    pub fn key_bytes(&self) -> Result<Option<[u8; 32]>, AuthError> {
        let Some(encoded) = &self.encryption_key else {
            return Ok(None);
        };
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::Config(format!("cookie.encryption_key is not base64: {e}")))?;
        let key: [u8; 32] = raw.try_into().map_err(|_| {
            AuthError::Config("cookie.encryption_key must decode to 32 bytes".to_string())
        })?;
        Ok(Some(key))
    }
}

impl Settings {
    /// Load from `config.toml` and the environment
    pub fn load() -> Result<Self, AuthError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from the given file and the environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let settings: Settings = Self::figment_from(path)
            .extract()
            .map_err(|e| AuthError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Layered sources: defaults, then the TOML file, then `AUTOLOGIN_*` variables.
    /// A missing file is not an error.
    pub fn figment_from<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check the settings for values the auth core cannot work with
    pub fn validate(&self) -> Result<(), AuthError> {
        let name = &self.cookie.name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AuthError::Config(format!("invalid cookie name {name:?}")));
        }

        if self.cookie.max_age_secs == 0 {
            return Err(AuthError::Config(
                "cookie.max_age_secs must be positive".to_string(),
            ));
        }

        if self.cookie.max_age_secs > MAX_COOKIE_AGE_SECS {
            return Err(AuthError::Config(format!(
                "cookie.max_age_secs must not exceed {MAX_COOKIE_AGE_SECS}"
            )));
        }

        if self.token.bytes < MIN_TOKEN_BYTES {
            return Err(AuthError::Config(format!(
                "token.bytes must be at least {MIN_TOKEN_BYTES}"
            )));
        }

        if self.identification.trim().is_empty() {
            return Err(AuthError::Config(
                "identification field must not be empty".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(AuthError::Config(format!(
                "unknown log level {:?}",
                self.log_level
            )));
        }

        if self.session.absolute_ttl_secs == 0 || self.session.idle_ttl_secs == 0 {
            return Err(AuthError::Config(
                "session timeouts must be positive".to_string(),
            ));
        }

        self.cookie.key_bytes()?;
        Ok(())
    }

    /// Location of the generated cookie key
    pub fn cookie_key_path(&self) -> PathBuf {
        self.storage.path.join("cookie_key")
    }

    pub fn token_store_path(&self) -> PathBuf {
        self.storage.path.join("autologin_tokens.json")
    }

    pub fn user_store_path(&self) -> PathBuf {
        self.storage.path.join("users.json")
    }
}
