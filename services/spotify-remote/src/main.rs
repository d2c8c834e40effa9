//! Spotify Remote
//!
//! Command-line remote for Spotify playback:
//! 1. Loads the client configuration
//! 2. Signs in through the browser (authorization code + PKCE)
//! 3. Issues one playback command with the fresh token

mod command;
mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use spotify_auth::{Authenticator, TokenStore};
use spotify_player::PlayerClient;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    // Bad usage exits here, before a browser round trip
    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        redirect_uri = %config.spotify.redirect_uri,
        api_base_url = %config.api.base_url,
        command = ?cli.command,
        "configuration loaded"
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let auth = Arc::new(Authenticator::new(
        config.spotify,
        http_client.clone(),
        Arc::new(TokenStore::new()),
    ));
    auth.login().await.context("login failed")?;

    let player = PlayerClient::new(auth, http_client).with_base_url(&config.api.base_url);
    cli.command.run(&player).await
}
