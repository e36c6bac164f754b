// crates/autologin-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Authentication error types with error codes and context
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("User is not activated")]
    NotActivated,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cookie could not be decoded")]
    DecodeFailure,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Cookie encryption failed: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error classification, as reported by `AuthRequest::error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    #[serde(rename = "not_found")]
    UserNotFound,
    NotActivated,
    WrongPassword,
    StoreUnavailable,
    DecodeFailure,
    Internal,
}

impl AuthErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthErrorKind::UserNotFound => "not_found",
            AuthErrorKind::NotActivated => "not_activated",
            AuthErrorKind::WrongPassword => "wrong_password",
            AuthErrorKind::StoreUnavailable => "store_unavailable",
            AuthErrorKind::DecodeFailure => "decode_failure",
            AuthErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthError {
    /// Wrap any store backend failure
    pub fn store(err: impl std::fmt::Display) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }

    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::UserNotFound => AuthErrorKind::UserNotFound,
            AuthError::NotActivated => AuthErrorKind::NotActivated,
            AuthError::WrongPassword => AuthErrorKind::WrongPassword,
            AuthError::StoreUnavailable(_) => AuthErrorKind::StoreUnavailable,
            AuthError::DecodeFailure => AuthErrorKind::DecodeFailure,
            _ => AuthErrorKind::Internal,
        }
    }

    /// Whether this is one of the user-facing credential failures
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::UserNotFound | AuthError::NotActivated | AuthError::WrongPassword
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UserNotFound | AuthError::WrongPassword | AuthError::DecodeFailure => {
                StatusCode::UNAUTHORIZED
            },
            AuthError::NotActivated => StatusCode::FORBIDDEN,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::UserNotFound => "AUTH_001",
            AuthError::WrongPassword => "AUTH_002",
            AuthError::NotActivated => "AUTH_003",
            AuthError::DecodeFailure => "AUTH_004",
            AuthError::StoreUnavailable(_) => "STORE_001",
            AuthError::Hashing(_) => "HASH_001",
            AuthError::Crypto(_) => "CRYPTO_001",
            AuthError::Config(_) => "CFG_001",
            AuthError::Io(_) => "IO_001",
            AuthError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            // Unknown user and bad password must look identical from outside.
            AuthError::UserNotFound | AuthError::WrongPassword | AuthError::DecodeFailure => {
                "Authentication failed".to_string()
            },
            AuthError::NotActivated => "Account is not activated".to_string(),
            AuthError::StoreUnavailable(_) => {
                "Service temporarily unavailable, please try again later".to_string()
            },
            _ => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
