//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and S256 challenge for one login attempt. The
//! verifier stays inside the `Authenticator` until the code exchange and is
//! zeroized when the attempt ends; the challenge goes out in the
//! authorization URL so Spotify can tie the returned code to this client.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;
use crate::constants::CODE_CHALLENGE_METHOD;

/// Bytes of OS-seeded CSPRNG output behind each verifier.
const VERIFIER_BYTES: usize = 64;

/// Verifier/challenge pair for a single login attempt. Never reused.
#[derive(Debug)]
pub struct PkceMaterial {
    pub verifier: Secret<String>,
    pub challenge: String,
}

impl PkceMaterial {
    /// Fresh material from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(verifier.expose());
        Self {
            verifier,
            challenge,
        }
    }

    /// Always `S256`.
    pub fn method(&self) -> &'static str {
        CODE_CHALLENGE_METHOD
    }
}

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 without padding gives 86
/// characters, inside RFC 7636's 43..=128 range.
pub fn generate_verifier() -> Secret<String> {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill(&mut bytes);
    Secret::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// `BASE64URL(SHA256(verifier))`, unpadded.
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the authorization URL the user opens in a browser.
///
/// Every parameter value is percent-encoded; scopes are space-joined first.
pub fn build_authorization_url(config: &AuthConfig, challenge: &str) -> String {
    let scope = config.scopes.join(" ");
    let params = [
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("scope", scope.as_str()),
        ("code_challenge_method", CODE_CHALLENGE_METHOD),
        ("code_challenge", challenge),
    ];
    let query = params
        .iter()
        .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{query}", config.authorize_endpoint)
}
