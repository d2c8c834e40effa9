//! Error types for player commands

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] spotify_auth::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, Error>;
