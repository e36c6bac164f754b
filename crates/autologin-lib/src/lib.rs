// ============================
// crates/autologin-lib/src/lib.rs
// ============================
//! Remember-me authentication: credential login, rotating autologin tokens
//! and the stores, codecs and session holders they run on.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;

pub use auth::{AuthOptions, AuthRequest, Authenticator, Remember};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Settings;
pub use error::{AuthError, AuthErrorKind};
pub use storage::{
    FileTokenStore, FileUserStore, MemoryTokenStore, MemoryUserStore, TokenRecord, TokenStore,
    UserStore,
};
