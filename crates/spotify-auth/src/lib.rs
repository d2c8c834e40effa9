//! Spotify OAuth (Authorization Code + PKCE) client
//!
//! Obtains, holds, validates and silently refreshes the credentials used by
//! the playback command client. Tokens live only in memory for the lifetime
//! of the process.
//!
//! Credential flow:
//! 1. `Authenticator::login()` generates fresh `PkceMaterial`
//! 2. A `CallbackListener` binds the redirect URI's host, port and path
//! 3. The authorization URL is handed to a `BrowserLauncher`
//! 4. The listener captures `code` or `error` from the redirect, then unbinds
//! 5. `token::request_token()` exchanges the code; the `TokenStore` is replaced
//! 6. `Authenticator::ensure_valid()` refreshes within 30s of expiry, one caller at a time

pub mod authenticator;
pub mod browser;
pub mod callback;
pub mod config;
pub mod constants;
pub mod error;
pub mod extract;
pub mod pkce;
pub mod store;
pub mod token;

pub use authenticator::{AccessTokenSource, Authenticator};
pub use browser::{BrowserLauncher, SystemBrowser};
pub use callback::{AuthorizationResult, CallbackListener, await_authorization};
pub use config::{AuthConfig, RedirectTarget};
pub use constants::*;
pub use error::{Error, Result};
pub use extract::{extract, extract_number};
pub use pkce::{PkceMaterial, build_authorization_url};
pub use store::{Credential, TokenStore, now_millis};
pub use token::{Grant, TokenGrant, request_token};
