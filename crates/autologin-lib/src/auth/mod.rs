// ============================
// crates/autologin-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod authenticator;
pub mod cookie;
pub mod password;
pub mod session;
pub mod token_generator;
pub mod transport;

pub use authenticator::{AuthOptions, AuthRequest, Authenticator, Remember};
pub use cookie::{generate_key, load_or_generate_key, AesGcmEncrypter, CookieCodec, Encrypter};
pub use password::{verify_password, CredentialVerifier, PasswordAlgorithm};
pub use session::{
    ManagedSession, MemorySession, SessionManager, SessionState, SESSION_ABSOLUTE_TTL,
    SESSION_IDLE_TTL,
};
pub use token_generator::{
    generate_secure_token, generate_secure_token_with_size, HashAlgorithm, DEFAULT_TOKEN_BYTES,
};
pub use transport::{CookieAttributes, CookieJar, CookieTransport, SetCookie};
