//! Token endpoint requests
//!
//! Code exchange and refresh share one request shape: a form-encoded POST
//! carrying `grant_type`, the grant's own fields and `client_id`. Both are
//! answered with the same small payload, parsed with `extract` rather than a
//! full deserializer.

use std::time::Duration;

use common::Secret;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::constants::DEFAULT_EXPIRES_IN_SECS;
use crate::error::{Error, Result};
use crate::extract::{extract, extract_number};

/// What is being traded in at the token endpoint.
#[derive(Debug, Clone, Copy)]
pub enum Grant<'a> {
    /// Initial exchange: the code from the redirect plus the PKCE verifier.
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
        verifier: &'a str,
    },
    /// Silent renewal with a previously issued refresh token.
    RefreshToken { refresh_token: &'a str },
}

impl Grant<'_> {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }

    fn form<'a>(&'a self, client_id: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![("grant_type", self.grant_type())];
        match self {
            Grant::AuthorizationCode {
                code,
                redirect_uri,
                verifier,
            } => {
                form.push(("code", *code));
                form.push(("redirect_uri", *redirect_uri));
                form.push(("code_verifier", *verifier));
            }
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", *refresh_token));
            }
        }
        form.push(("client_id", client_id));
        form
    }
}

/// Tokens issued by one successful token endpoint call.
///
/// `expires_in` is a delta in seconds; the `TokenStore` turns it into an
/// absolute expiry when the grant is applied.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
    pub expires_in: u64,
}

impl TokenGrant {
    /// Parse a 200 response body.
    ///
    /// `access_token` is required and must be non-empty. An absent or empty
    /// `refresh_token` is `None`. A missing or non-numeric `expires_in` falls
    /// back to one hour.
    pub fn parse(body: &str) -> Result<Self> {
        let access_token = extract(body, "access_token")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::TokenResponseMalformed("access_token missing or empty".into()))?;
        let refresh_token = extract(body, "refresh_token").filter(|token| !token.is_empty());
        let expires_in = extract_number(body, "expires_in")
            .and_then(|digits| digits.parse::<u64>().ok())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        Ok(Self {
            access_token: Secret::new(access_token),
            refresh_token: refresh_token.map(Secret::new),
            expires_in,
        })
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_in)
    }
}

/// POST `grant` to the configured token endpoint.
///
/// Anything but 200 is `TokenRequestFailed` with the status and body kept for
/// diagnostics. No retries.
pub async fn request_token(
    client: &reqwest::Client,
    config: &AuthConfig,
    grant: Grant<'_>,
) -> Result<TokenGrant> {
    let grant_type = grant.grant_type();
    let response = client
        .post(&config.token_endpoint)
        .form(&grant.form(&config.client_id))
        .send()
        .await
        .map_err(|e| {
            record(grant_type, "transport_error");
            Error::Http(format!("{grant_type} request failed: {e}"))
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| {
            record(grant_type, "transport_error");
            Error::Http(format!("reading token response: {e}"))
        })?;

    if status.as_u16() != 200 {
        record(grant_type, "rejected");
        warn!(grant_type, status = status.as_u16(), "token endpoint rejected request");
        return Err(Error::TokenRequestFailed {
            status: status.as_u16(),
            body,
        });
    }

    let grant = TokenGrant::parse(&body).inspect_err(|_| record(grant_type, "malformed"))?;
    record(grant_type, "ok");
    info!(
        grant_type,
        expires_in = grant.expires_in,
        refresh_token_issued = grant.refresh_token.is_some(),
        "token endpoint issued credentials"
    );
    Ok(grant)
}

fn record(grant_type: &'static str, result: &'static str) {
    metrics::counter!("spotify_token_requests_total", "grant_type" => grant_type, "result" => result)
        .increment(1);
}
