//! Spotify OAuth constants
//!
//! Public endpoint and scope configuration for the Spotify Accounts service.
//! None of these are secrets; the client ID is supplied by the caller because
//! every application registers its own.

use std::time::Duration;

/// Browser-facing authorization endpoint
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Loopback redirect URI. Must be registered verbatim in the Spotify dashboard.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Scopes needed to control playback and list devices.
pub const PLAYBACK_SCOPES: [&str; 2] = ["user-modify-playback-state", "user-read-playback-state"];

/// PKCE challenge method. Spotify only accepts S256.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Lifetime assumed when the token response omits or garbles `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Refresh this long before the declared expiry to absorb clock skew and
/// request latency.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// How long `login()` waits for the browser to come back.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;
