// ==============
// crates/autologin-lib/src/metrics.rs

//! Central place for metric keys
pub const LOGIN_SUCCEEDED: &str = "auth.login.succeeded";
pub const LOGIN_FAILED: &str = "auth.login.failed";
pub const LOGOUT: &str = "auth.logout";
pub const AUTOLOGIN_SUCCEEDED: &str = "auth.autologin.succeeded";
pub const AUTOLOGIN_REJECTED: &str = "auth.autologin.rejected";
pub const TOKEN_ISSUED: &str = "auth.token.issued";
pub const TOKEN_ROTATED: &str = "auth.token.rotated";
pub const TOKEN_ROTATION_LOST: &str = "auth.token.rotation_lost";
pub const TOKEN_REVOKED: &str = "auth.token.revoked";
pub const TOKEN_CLEANED: &str = "auth.token.cleaned";
pub const SESSION_ACTIVE: &str = "session.active";
pub const SESSION_EXPIRED: &str = "session.expired";
