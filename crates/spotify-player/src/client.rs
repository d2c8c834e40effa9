//! Playback command client
//!
//! One request per command, no retries. The token comes from
//! `AccessTokenSource` on every call, so an expiring token is refreshed
//! before the request goes out.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use spotify_auth::AccessTokenSource;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::json::{play_body, transfer_body};
use crate::metrics::record_command;
use crate::outcome::CommandOutcome;

pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

pub struct PlayerClient {
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
    http_client: reqwest::Client,
}

impl PlayerClient {
    pub fn new(tokens: Arc<dyn AccessTokenSource>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            tokens,
            http_client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start playing `uri`, optionally on a specific device.
    pub async fn play(&self, uri: &str, device_id: Option<&str>) -> Result<CommandOutcome> {
        let path = match device_id {
            Some(id) => format!("/me/player/play?device_id={}", urlencoding::encode(id)),
            None => "/me/player/play".to_string(),
        };
        let result = self
            .send(Method::PUT, &path, Some(play_body(uri)))
            .await
            .map(|(status, body)| match status {
                204 => CommandOutcome::Success(()),
                404 => CommandOutcome::NoActiveDevice,
                403 => CommandOutcome::Forbidden,
                _ => CommandOutcome::TransportFailure { status, body },
            });
        finish("play", result)
    }

    pub async fn pause(&self) -> Result<CommandOutcome> {
        let result = self.send(Method::PUT, "/me/player/pause", None).await;
        finish("pause", result.map(expect_no_content))
    }

    pub async fn next(&self) -> Result<CommandOutcome> {
        let result = self.send(Method::POST, "/me/player/next", None).await;
        finish("next", result.map(expect_no_content))
    }

    pub async fn previous(&self) -> Result<CommandOutcome> {
        let result = self.send(Method::POST, "/me/player/previous", None).await;
        finish("previous", result.map(expect_no_content))
    }

    /// Raw `/me/player/devices` response body on 200.
    pub async fn list_devices(&self) -> Result<CommandOutcome<String>> {
        let result = self
            .send(Method::GET, "/me/player/devices", None)
            .await
            .map(|(status, body)| match status {
                200 => CommandOutcome::Success(body),
                _ => CommandOutcome::TransportFailure { status, body },
            });
        finish("devices", result)
    }

    /// Move playback to `device_id`; `play` resumes playback there.
    pub async fn transfer(&self, device_id: &str, play: bool) -> Result<CommandOutcome> {
        let result = self
            .send(Method::PUT, "/me/player", Some(transfer_body(device_id, play)))
            .await;
        finish("transfer", result.map(expect_no_content))
    }

    /// Issue one request and return its status and body text.
    async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<(u16, String)> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "sending player command");

        let mut request = self
            .http_client
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", token.expose()));
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok((status, text))
    }
}

fn expect_no_content((status, body): (u16, String)) -> CommandOutcome {
    match status {
        204 => CommandOutcome::Success(()),
        _ => CommandOutcome::TransportFailure { status, body },
    }
}

fn finish<T>(
    operation: &'static str,
    result: Result<CommandOutcome<T>>,
) -> Result<CommandOutcome<T>> {
    match &result {
        Ok(outcome) if outcome.is_success() => {
            info!(operation, "player command succeeded");
            record_command(operation, outcome.label());
        }
        Ok(outcome) => {
            warn!(operation, outcome = %outcome, "player command not applied");
            record_command(operation, outcome.label());
        }
        Err(e) => {
            warn!(operation, error = %e, "player command failed");
            record_command(operation, "error");
        }
    }
    result
}
