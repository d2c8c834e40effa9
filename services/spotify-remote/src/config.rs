//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client id may come from SPOTIFY_CLIENT_ID instead of the file.

use serde::Deserialize;
use spotify_auth::AuthConfig;
use spotify_player::API_BASE_URL;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub spotify: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Web API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(client_id) = std::env::var("SPOTIFY_CLIENT_ID") {
            config.spotify.client_id = client_id;
        }
        config.spotify.client_id = config.spotify.client_id.trim().to_owned();

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.spotify.client_id.is_empty() {
            return Err(common::Error::Config(
                "client_id is required (set [spotify].client_id or SPOTIFY_CLIENT_ID)".into(),
            ));
        }

        if !is_http_url(&self.spotify.redirect_uri) {
            return Err(common::Error::Config(format!(
                "redirect_uri must start with http:// or https://, got: {}",
                self.spotify.redirect_uri
            )));
        }

        if !is_http_url(&self.api.base_url) {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.spotify.callback_timeout_secs == 0 {
            return Err(common::Error::Config(
                "callback_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("spotify-remote.toml")
    }
}
