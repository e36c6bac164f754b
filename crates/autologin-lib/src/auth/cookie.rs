// ============================
// crates/autologin-lib/src/auth/cookie.rs
// ============================
/** Remember-me cookie codec.

The payload `{id, key}` is serialized as JSON and, when encryption is on,
sealed with AES-256-GCM (`nonce || ciphertext`) before being base64url encoded.
Decoding never reports why it failed: tampered, truncated and absent cookies
all come back as `None`. */
use crate::error::AuthError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use autologin_common::CookiePayload;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use rand::{rngs::OsRng, RngCore};
use std::{fmt, fs, path::Path, sync::Arc};
use tracing::debug;
use zeroize::Zeroize;

const NONCE_SIZE: usize = 12;
pub const KEY_SIZE: usize = 32;

/// Authenticated encryption capability used by the codec
pub trait Encrypter: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, AuthError>;

    /// `None` on any authentication or framing failure
    fn decrypt(&self, sealed: &[u8]) -> Option<Vec<u8>>;
}

/// AES-256-GCM with a fresh random nonce per message
pub struct AesGcmEncrypter {
    cipher: Aes256Gcm,
}

impl AesGcmEncrypter {
    pub fn new(key: &[u8; KEY_SIZE]) -> Result<Self, AuthError> {
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|e| AuthError::Crypto(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Build from a standard base64 encoded key
    pub fn from_base64(encoded: &str) -> Result<Self, AuthError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::Config(format!("invalid key encoding: {e}")))?;
        let key: [u8; KEY_SIZE] = raw
            .try_into()
            .map_err(|_| AuthError::Config("Invalid encryption key length".to_string()))?;
        Self::new(&key)
    }
}

impl fmt::Debug for AesGcmEncrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesGcmEncrypter { .. }")
    }
}

impl Encrypter for AesGcmEncrypter {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, AuthError> {
        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let encrypted = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AuthError::Crypto(e.to_string()))?;

        // Combine nonce and encrypted data
        let mut combined = Vec::with_capacity(NONCE_SIZE + encrypted.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&encrypted);
        Ok(combined)
    }

    fn decrypt(&self, sealed: &[u8]) -> Option<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return None;
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .ok()
    }
}

/// Serializes `CookiePayload`s to and from the opaque cookie value
#[derive(Clone, Default)]
pub struct CookieCodec {
    encrypter: Option<Arc<dyn Encrypter>>,
}

impl fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCodec")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

impl CookieCodec {
    /// Codec that only serializes; cookies can be read and forged by the client
    pub fn plain() -> Self {
        Self { encrypter: None }
    }

    pub fn encrypted(encrypter: Arc<dyn Encrypter>) -> Self {
        Self {
            encrypter: Some(encrypter),
        }
    }

    pub fn with_key(key: &[u8; KEY_SIZE]) -> Result<Self, AuthError> {
        Ok(Self::encrypted(Arc::new(AesGcmEncrypter::new(key)?)))
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypter.is_some()
    }

    pub fn encode(&self, payload: &CookiePayload) -> Result<String, AuthError> {
        let mut json = serde_json::to_vec(payload)?;
        let bytes = match &self.encrypter {
            Some(encrypter) => {
                let sealed = encrypter.encrypt(&json);
                json.zeroize();
                sealed?
            },
            None => json,
        };
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn decode(&self, value: &str) -> Option<CookiePayload> {
        let raw = match URL_SAFE_NO_PAD.decode(value) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("Autologin cookie is not valid base64");
                return None;
            },
        };

        let mut plaintext = match &self.encrypter {
            Some(encrypter) => match encrypter.decrypt(&raw) {
                Some(plaintext) => plaintext,
                None => {
                    debug!("Autologin cookie failed authentication");
                    return None;
                },
            },
            None => raw,
        };

        let payload = serde_json::from_slice::<CookiePayload>(&plaintext).ok();
        plaintext.zeroize();

        match payload {
            Some(payload) if !payload.key.is_empty() => Some(payload),
            _ => {
                debug!("Autologin cookie payload is malformed");
                None
            },
        }
    }
}

/// Generate a random nonce for AES-GCM
fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generate a fresh random cookie key
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Load the cookie key from `path`, creating it when missing
pub fn load_or_generate_key(path: &Path) -> Result<[u8; KEY_SIZE], AuthError> {
    if path.exists() {
        let key_data = fs::read(path)?;
        if key_data.len() != KEY_SIZE {
            return Err(AuthError::Config(format!(
                "Invalid encryption key length in {}",
                path.display()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&key_data);
        Ok(key)
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let key = generate_key();
        fs::write(path, key)?;
        Ok(key)
    }
}
