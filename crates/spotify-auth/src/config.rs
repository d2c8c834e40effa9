//! OAuth client configuration
//!
//! `AuthConfig` deserializes from the `[spotify]` table of the caller's config
//! file; every field except `client_id` has a default from `constants.rs`.
//! An absent `client_id` deserializes empty so callers can fill it from the
//! environment before validating.
//! Endpoints are overridable so tests can point the flow at a local server.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::constants::{
    AUTHORIZE_ENDPOINT, DEFAULT_CALLBACK_TIMEOUT_SECS, DEFAULT_REDIRECT_URI, PLAYBACK_SCOPES,
    TOKEN_ENDPOINT,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// May be left out of the file when the caller supplies it another way.
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_authorize_endpoint")]
    pub authorize_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_authorize_endpoint() -> String {
    AUTHORIZE_ENDPOINT.to_string()
}

fn default_token_endpoint() -> String {
    TOKEN_ENDPOINT.to_string()
}

fn default_scopes() -> Vec<String> {
    PLAYBACK_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_callback_timeout() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT_SECS
}

impl AuthConfig {
    /// Config for `client_id` with all defaults.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: default_redirect_uri(),
            authorize_endpoint: default_authorize_endpoint(),
            token_endpoint: default_token_endpoint(),
            scopes: default_scopes(),
            callback_timeout_secs: default_callback_timeout(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_token_endpoint(mut self, token_endpoint: impl Into<String>) -> Self {
        self.token_endpoint = token_endpoint.into();
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout_secs = timeout.as_secs();
        self
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    /// Host, port and path the callback listener must bind for `redirect_uri`.
    pub fn redirect_target(&self) -> Result<RedirectTarget> {
        RedirectTarget::parse(&self.redirect_uri)
    }
}

/// Where the local listener waits for the browser redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Host as written in the URI, without IPv6 brackets.
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RedirectTarget {
    /// Parse a redirect URI. An explicit port is required; an empty path becomes `/`.
    pub fn parse(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri).map_err(|e| {
            Error::Configuration(format!("invalid redirect_uri {redirect_uri:?}: {e}"))
        })?;
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::Configuration(format!("redirect_uri has no host: {redirect_uri:?}"))
            })?;
        let port = url.port().ok_or_else(|| {
            Error::Configuration(format!(
                "redirect_uri must include an explicit port, e.g. {DEFAULT_REDIRECT_URI}; got {redirect_uri:?}"
            ))
        })?;
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Ok(Self { host, port, path })
    }
}
