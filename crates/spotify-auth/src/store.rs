//! In-memory token store
//!
//! Holds the single `Credential` for this process. Every mutation goes through
//! `replace`, `apply_grant` or `clear`, each of which swaps the whole
//! credential under one write lock, so readers never observe a half-updated
//! token. Nothing is persisted; a restart means a new login.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::Secret;
use tokio::sync::RwLock;
use tracing::debug;

use crate::token::TokenGrant;

/// The current OAuth credentials.
///
/// `expires_at` is a unix timestamp in milliseconds, computed as "now +
/// `expires_in`" at the moment the token endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
    pub expires_at: u64,
}

impl Credential {
    /// Build from a fresh grant, keeping `previous_refresh` when the grant
    /// did not rotate the refresh token.
    pub fn from_grant(
        grant: TokenGrant,
        previous_refresh: Option<Secret<String>>,
        now_millis: u64,
    ) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh),
            expires_at: now_millis.saturating_add(grant.expires_in.saturating_mul(1000)),
        }
    }

    /// True when the token expires within `margin` of `now_millis` (or already has).
    pub fn expires_within(&self, margin: Duration, now_millis: u64) -> bool {
        self.expires_at <= now_millis.saturating_add(margin.as_millis() as u64)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now_millis: u64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now_millis))
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Single-credential store shared by the `Authenticator` and its callers.
#[derive(Debug, Default)]
pub struct TokenStore {
    state: RwLock<Option<Credential>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the current credential, if logged in.
    pub async fn get(&self) -> Option<Credential> {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Swap in a complete credential.
    pub async fn replace(&self, credential: Credential) {
        *self.state.write().await = Some(credential);
        debug!("credential replaced");
    }

    /// Apply a token endpoint grant as one update.
    ///
    /// The previous refresh token is carried over when the grant has none;
    /// reading it and writing the merged credential happen under the same lock.
    pub async fn apply_grant(&self, grant: TokenGrant) -> Credential {
        let mut state = self.state.write().await;
        let previous_refresh = state.as_ref().and_then(|c| c.refresh_token.clone());
        let retained = grant.refresh_token.is_none() && previous_refresh.is_some();
        let credential = Credential::from_grant(grant, previous_refresh, now_millis());
        *state = Some(credential.clone());
        debug!(
            expires_at = credential.expires_at,
            refresh_token_retained = retained,
            "credential updated from grant"
        );
        credential
    }

    /// Forget the credential. Returns what was held.
    pub async fn clear(&self) -> Option<Credential> {
        let removed = self.state.write().await.take();
        if removed.is_some() {
            debug!("credential cleared");
        }
        removed
    }
}
