//! Error types for OAuth authentication operations

use std::time::Duration;

/// Errors from the credential lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("redirect carried neither an authorization code nor an error")]
    NoAuthorizationCode,

    #[error("no authorization callback received within {}s", .0.as_secs())]
    AuthorizationTimedOut(Duration),

    #[error("a login is already in progress")]
    LoginInProgress,

    #[error("token endpoint returned {status}: {body}")]
    TokenRequestFailed { status: u16, body: String },

    #[error("malformed token response: {0}")]
    TokenResponseMalformed(String),

    #[error("not authenticated, call login() first")]
    NotAuthenticated,

    #[error("access token expired and no refresh token is held, log in again")]
    MissingRefreshToken,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("callback listener failed: {0}")]
    Listener(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
