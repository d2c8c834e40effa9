//! Authenticated playback commands against the Spotify Web API
//!
//! `PlayerClient` turns each command into one HTTP request with a bearer
//! token from an `AccessTokenSource` and maps the response status to a
//! `CommandOutcome`. Non-success statuses are outcomes, not errors; only
//! auth failures and transport failures are `Err`.

pub mod client;
pub mod error;
pub mod json;
pub mod metrics;
pub mod outcome;

pub use client::{API_BASE_URL, PlayerClient};
pub use error::{Error, Result};
pub use outcome::CommandOutcome;
