//! Common types shared by the Spotify remote-control crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
