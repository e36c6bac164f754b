// ============================
// crates/autologin-lib/src/auth/authenticator.rs
// ============================
/** Login, logout and remember-me autologin.
`Authenticator` holds the long-lived collaborators and policy. Each request
gets an `AuthRequest` bound to that request's session and cookies; every
operation goes through it so nothing about "the current request" is global. */
use super::{
    cookie::{load_or_generate_key, CookieCodec},
    password::CredentialVerifier,
    session::SessionState,
    token_generator::{generate_secure_token_with_size, HashAlgorithm, DEFAULT_TOKEN_BYTES},
    transport::{CookieAttributes, CookieTransport},
};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::error::{AuthError, AuthErrorKind};
use crate::metrics::{
    AUTOLOGIN_REJECTED, AUTOLOGIN_SUCCEEDED, LOGIN_FAILED, LOGIN_SUCCEEDED, LOGOUT,
    TOKEN_CLEANED, TOKEN_ISSUED, TOKEN_REVOKED, TOKEN_ROTATED, TOKEN_ROTATION_LOST,
};
use crate::storage::{TokenStore, UserStore};
use autologin_common::{CookiePayload, SessionSnapshot, SessionUser, UserId, UserRecord};
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Security event types for logging
#[derive(Debug, Clone, Copy)]
enum SecurityEvent {
    LoginSucceeded,
    LoginFailed,
    TokenIssued,
    TokenRotated,
    RotationRaceLost,
    TokenRejected,
    TokenRevoked,
    TokensSwept,
}

/// Log a security event on the dedicated target
fn log_security_event(event: SecurityEvent, user: Option<UserId>, details: &str) {
    let user = user.map(|id| id.0);
    match event {
        SecurityEvent::LoginFailed | SecurityEvent::RotationRaceLost => {
            warn!(target: "autologin::security", ?event, ?user, "{details}")
        },
        SecurityEvent::TokenRejected => {
            debug!(target: "autologin::security", ?event, ?user, "{details}")
        },
        _ => info!(target: "autologin::security", ?event, ?user, "{details}"),
    }
}

/// Policy knobs for the auth core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    pub cookie_name: String,
    /// Lifetime of the remember-me cookie and of its token row
    pub cookie_max_age: Duration,
    pub cookie_attributes: CookieAttributes,
    pub hash_algorithm: HashAlgorithm,
    /// User field matched against the identification given to `login`
    pub identification: String,
    pub token_bytes: usize,
    /// Drop the user's other grants when a new one is minted
    pub purge_on_login: bool,
    /// Sweep expired grants before minting
    pub clean_on_login: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            cookie_name: "autologin".to_string(),
            cookie_max_age: Duration::from_secs(60 * 60 * 24 * 60), // 60 days
            cookie_attributes: CookieAttributes::default(),
            hash_algorithm: HashAlgorithm::default(),
            identification: "username".to_string(),
            token_bytes: DEFAULT_TOKEN_BYTES,
            purge_on_login: true,
            clean_on_login: true,
        }
    }
}

impl AuthOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cookie_name: settings.cookie.name.clone(),
            cookie_max_age: settings.cookie.max_age(),
            cookie_attributes: CookieAttributes {
                path: settings.cookie.path.clone(),
                secure: settings.cookie.secure,
            },
            hash_algorithm: settings.token.hash_algorithm,
            identification: settings.identification.clone(),
            token_bytes: settings.token.bytes,
            purge_on_login: settings.token.purge_on_login,
            clean_on_login: settings.token.clean_on_login,
        }
    }
}

/// Outcome of the remember-me part of a successful `login`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remember {
    NotRequested,
    Issued,
    /// The login stands, but no grant was minted
    Failed(AuthErrorKind),
}

/// Long-lived auth service shared by every request
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    verifier: CredentialVerifier,
    codec: CookieCodec,
    clock: Arc<dyn Clock>,
    options: AuthOptions,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("verifier", &self.verifier)
            .field("codec", &self.codec)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        codec: CookieCodec,
        options: AuthOptions,
    ) -> Self {
        Self {
            users,
            tokens,
            verifier: CredentialVerifier::default(),
            codec,
            clock: Arc::new(SystemClock),
            options,
        }
    }

    /// Build from loaded settings. With encryption on, the key comes from
    /// `cookie.encryption_key` or is loaded from (or generated into) the
    /// storage directory.
    pub fn from_settings(
        settings: &Settings,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, AuthError> {
        let codec = if settings.cookie.encrypt {
            let key = match settings.cookie.key_bytes()? {
                Some(key) => key,
                None => load_or_generate_key(&settings.cookie_key_path())?,
            };
            CookieCodec::with_key(&key)?
        } else {
            warn!("Cookie encryption is disabled; remember-me cookies are readable by clients");
            CookieCodec::plain()
        };

        Ok(Self::new(users, tokens, codec, AuthOptions::from_settings(settings))
            .with_verifier(CredentialVerifier::new(settings.password.algorithm)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_verifier(mut self, verifier: CredentialVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_codec(mut self, codec: CookieCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    pub fn codec(&self) -> &CookieCodec {
        &self.codec
    }

    /// Bind to one request without touching the session
    pub fn request<'a>(
        &'a self,
        session: &'a dyn SessionState,
        cookies: &'a dyn CookieTransport,
    ) -> AuthRequest<'a> {
        AuthRequest {
            auth: self,
            session,
            cookies,
            last_error: Mutex::new(None),
        }
    }

    /// Bind to one request and run autologin when the session is logged out
    pub async fn begin<'a>(
        &'a self,
        session: &'a dyn SessionState,
        cookies: &'a dyn CookieTransport,
    ) -> AuthRequest<'a> {
        let request = self.request(session, cookies);
        if !request.loggedin().await {
            request.autologin().await;
        }
        request
    }

    /// Hash a password for storage
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        self.verifier.hash_password(password)
    }

    /// Delete grants older than the cookie lifetime
    pub async fn clean_expired(&self) -> Result<usize, AuthError> {
        let now = self.clock.now();
        let cutoff = i64::try_from(self.options.cookie_max_age.as_secs())
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|max_age| now.checked_sub_signed(max_age))
            .ok_or_else(|| AuthError::Config("cookie max age out of range".to_string()))?;

        let removed = self.tokens.clean(cutoff).await?;
        if removed > 0 {
            counter!(TOKEN_CLEANED).increment(removed as u64);
            log_security_event(
                SecurityEvent::TokensSwept,
                None,
                &format!("Removed {removed} expired autologin tokens"),
            );
        }
        Ok(removed)
    }

    fn digest(&self, token: &str) -> String {
        self.options.hash_algorithm.digest(token)
    }

    async fn authenticate(
        &self,
        identification: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let user = self
            .users
            .get_by_field(&self.options.identification, identification)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.activated {
            return Err(AuthError::NotActivated);
        }

        if !self.verifier.verify_password(password, &user.password_hash) {
            return Err(AuthError::WrongPassword);
        }

        Ok(user)
    }
}

/// The auth core as seen from one request
pub struct AuthRequest<'a> {
    auth: &'a Authenticator,
    session: &'a dyn SessionState,
    cookies: &'a dyn CookieTransport,
    last_error: Mutex<Option<AuthErrorKind>>,
}

impl AuthRequest<'_> {
    /// Log in with credentials, optionally minting a remember-me grant.
    ///
    /// A failed grant does not undo the login; it is reported through
    /// `Remember::Failed` instead.
    pub async fn login(
        &self,
        identification: &str,
        password: &str,
        remember: bool,
    ) -> Result<Remember, AuthError> {
        let user = match self.auth.authenticate(identification, password).await {
            Ok(user) => user,
            Err(e) => {
                let kind = e.kind();
                *self.last_error.lock() = Some(kind);
                counter!(LOGIN_FAILED, "reason" => kind.as_str()).increment(1);
                log_security_event(
                    SecurityEvent::LoginFailed,
                    None,
                    &format!("Login rejected: {kind}"),
                );
                return Err(e);
            },
        };

        let user_id = user.id;
        self.session
            .store(SessionSnapshot::logged_in(user.into_session_user()))
            .await;
        counter!(LOGIN_SUCCEEDED).increment(1);
        log_security_event(SecurityEvent::LoginSucceeded, Some(user_id), "Login succeeded");

        if !remember {
            return Ok(Remember::NotRequested);
        }
        match self.create_autologin(user_id).await {
            Ok(()) => Ok(Remember::Issued),
            Err(e) => {
                warn!(user = user_id.0, error = %e, "Could not issue autologin token");
                Ok(Remember::Failed(e.kind()))
            },
        }
    }

    /// Revoke this device's grant, clear the cookie and end the session
    pub async fn logout(&self) {
        let name = &self.auth.options.cookie_name;

        if let Some(raw) = self.cookies.get_cookie(name) {
            if let Some(payload) = self.auth.codec.decode(&raw) {
                let hash = self.auth.digest(&payload.key);
                match self.auth.tokens.delete(payload.id, &hash).await {
                    Ok(()) => {
                        counter!(TOKEN_REVOKED).increment(1);
                        log_security_event(
                            SecurityEvent::TokenRevoked,
                            Some(payload.id),
                            "Autologin token revoked on logout",
                        );
                    },
                    Err(e) => warn!(user = payload.id.0, error = %e, "Could not revoke autologin token"),
                }
            }
            self.cookies.set_cookie(name, "", Duration::ZERO);
        }

        if self.loggedin().await {
            counter!(LOGOUT).increment(1);
        }
        self.session.destroy().await;
    }

    pub async fn loggedin(&self) -> bool {
        self.session.snapshot().await.logged_in
    }

    /// Log in from the remember-me cookie, rotating its token.
    ///
    /// Returns false for a missing, undecodable, unknown or already rotated
    /// token without touching the session, the store or the cookie.
    pub async fn autologin(&self) -> bool {
        let name = &self.auth.options.cookie_name;
        let Some(raw) = self.cookies.get_cookie(name) else {
            return false;
        };
        let Some(payload) = self.auth.codec.decode(&raw) else {
            counter!(AUTOLOGIN_REJECTED, "reason" => AuthErrorKind::DecodeFailure.as_str())
                .increment(1);
            return false;
        };

        let user_id = payload.id;
        let old_hash = self.auth.digest(&payload.key);
        match self.auth.tokens.exists(user_id, &old_hash).await {
            Ok(true) => {},
            Ok(false) => {
                counter!(AUTOLOGIN_REJECTED, "reason" => "unknown_token").increment(1);
                log_security_event(
                    SecurityEvent::TokenRejected,
                    Some(user_id),
                    "Unknown or already rotated autologin token",
                );
                return false;
            },
            Err(e) => {
                warn!(user = user_id.0, error = %e, "Token store unavailable during autologin");
                return false;
            },
        }

        let user = match self.auth.users.get_by_id(user_id).await {
            Ok(Some(user)) if user.activated => user,
            Ok(Some(_)) => {
                counter!(AUTOLOGIN_REJECTED, "reason" => AuthErrorKind::NotActivated.as_str())
                    .increment(1);
                debug!(user = user_id.0, "Autologin refused for deactivated user");
                return false;
            },
            Ok(None) => {
                counter!(AUTOLOGIN_REJECTED, "reason" => AuthErrorKind::UserNotFound.as_str())
                    .increment(1);
                debug!(user = user_id.0, "Autologin token belongs to a missing user");
                return false;
            },
            Err(e) => {
                warn!(user = user_id.0, error = %e, "User store unavailable during autologin");
                return false;
            },
        };

        self.session
            .store(SessionSnapshot::logged_in(user.into_session_user()))
            .await;
        counter!(AUTOLOGIN_SUCCEEDED).increment(1);
        self.rotate(user_id, &old_hash).await;
        true
    }

    /// Replace the presented token with a fresh one. Losing the race to a
    /// concurrent rotation leaves the client's cookie as it is.
    async fn rotate(&self, user_id: UserId, old_hash: &str) {
        let token = generate_secure_token_with_size(self.auth.options.token_bytes);
        let value = match self.auth.codec.encode(&CookiePayload {
            id: user_id,
            key: token.clone(),
        }) {
            Ok(value) => value,
            Err(e) => {
                warn!(user = user_id.0, error = %e, "Could not encode rotated autologin cookie");
                return;
            },
        };
        let new_hash = self.auth.digest(&token);

        match self.auth.tokens.update(user_id, old_hash, &new_hash).await {
            Ok(true) => {
                self.cookies
                    .set_cookie(&self.auth.options.cookie_name, &value, self.auth.options.cookie_max_age);
                counter!(TOKEN_ROTATED).increment(1);
                log_security_event(SecurityEvent::TokenRotated, Some(user_id), "Autologin token rotated");
            },
            Ok(false) => {
                counter!(TOKEN_ROTATION_LOST).increment(1);
                log_security_event(
                    SecurityEvent::RotationRaceLost,
                    Some(user_id),
                    "Autologin token was rotated by a concurrent request",
                );
            },
            Err(e) => warn!(user = user_id.0, error = %e, "Could not rotate autologin token"),
        }
    }

    /// Mint a remember-me grant for `user` and hand it to the client.
    ///
    /// The cookie is only written once the hashed token is stored.
    pub async fn create_autologin(&self, user: UserId) -> Result<(), AuthError> {
        let options = &self.auth.options;
        if options.clean_on_login {
            if let Err(e) = self.auth.clean_expired().await {
                warn!(error = %e, "Expired token sweep failed");
            }
        }

        let token = generate_secure_token_with_size(options.token_bytes);
        let value = self.auth.codec.encode(&CookiePayload {
            id: user,
            key: token.clone(),
        })?;
        let hash = self.auth.digest(&token);

        if options.purge_on_login {
            self.auth.tokens.purge(user).await?;
        }
        self.auth.tokens.insert(user, &hash).await?;

        self.cookies
            .set_cookie(&options.cookie_name, &value, options.cookie_max_age);
        counter!(TOKEN_ISSUED).increment(1);
        log_security_event(SecurityEvent::TokenIssued, Some(user), "Autologin token issued");
        Ok(())
    }

    /// The cached user, `None` when logged out
    pub async fn user(&self) -> Option<SessionUser> {
        self.session.snapshot().await.user().cloned()
    }

    pub async fn userid(&self) -> Option<UserId> {
        self.user().await.map(|user| user.id)
    }

    /// Value of the configured identification field
    pub async fn identification(&self) -> Option<String> {
        let user = self.user().await?;
        match user.field(&self.auth.options.identification)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub async fn field(&self, name: &str) -> Option<Value> {
        self.user().await?.field(name).cloned()
    }

    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        self.auth.hash(password)
    }

    /// Kind of the most recent failed `login` on this request
    pub fn error(&self) -> Option<AuthErrorKind> {
        *self.last_error.lock()
    }
}
