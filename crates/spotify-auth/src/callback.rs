//! Transient local listener for the OAuth redirect
//!
//! Binds the redirect URI's port, serves exactly one meaningful request on the
//! redirect path, and tears itself down. Binding and waiting are split so the
//! caller can surface the authorization URL only once the port is held:
//!
//! ```no_run
//! # async fn run() -> spotify_auth::Result<()> {
//! use std::time::Duration;
//! let listener = spotify_auth::CallbackListener::bind("127.0.0.1", 8888, "/callback").await?;
//! // ... open the authorization URL ...
//! let result = listener.wait(Duration::from_secs(300)).await?;
//! # Ok(()) }
//! ```
//!
//! The listener binds the redirect URI's own host: an IP literal as given,
//! `localhost` on both loopback addresses, other names as resolved. Sockets are
//! released before `wait` returns on every path (redirect, timeout, server
//! failure), so the next login can bind the same port.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Upper bound on draining the acknowledgement response before the server
/// task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Query parameters captured from the redirect.
///
/// Both fields `None` means the provider (or whoever hit the port) sent a
/// callback without a usable result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationResult {
    pub code: Option<String>,
    pub error: Option<String>,
}

impl AuthorizationResult {
    /// Parse `code` and `error` from a raw query string. Empty values count as absent.
    pub fn from_query(query: Option<&str>) -> Self {
        let query = query.unwrap_or_default();
        Self {
            code: query_param(query, "code"),
            error: query_param(query, "error"),
        }
    }

    /// The authorization code, or the failure the redirect represents.
    pub fn into_code(self) -> Result<String> {
        if let Some(error) = self.error {
            return Err(Error::AuthorizationDenied(error));
        }
        self.code.ok_or(Error::NoAuthorizationCode)
    }
}

/// First value of `name` in an `application/x-www-form-urlencoded` query.
pub(crate) fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| decode(key) == name)
        .map(|(_, value)| decode(value))
        .filter(|value| !value.is_empty())
}

fn decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Completion slot shared with the handler. Taken by the first redirect.
#[derive(Clone)]
struct CallbackState {
    completion: Arc<Mutex<Option<oneshot::Sender<AuthorizationResult>>>>,
}

/// A bound, not yet serving, redirect listener.
#[derive(Debug)]
pub struct CallbackListener {
    listeners: Vec<TcpListener>,
    path: String,
    local_addrs: Vec<SocketAddr>,
}

impl CallbackListener {
    /// Bind `port` on every address `host` stands for.
    ///
    /// A port already in use is a configuration error. Addresses that cannot
    /// be bound for other reasons (an IPv6 loopback on a host without IPv6)
    /// are skipped as long as at least one address binds.
    pub async fn bind(host: &str, port: u16, path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(Error::Configuration(format!(
                "callback path must start with '/', got {path:?}"
            )));
        }

        let mut port = port;
        let mut listeners = Vec::new();
        let mut local_addrs = Vec::new();
        let mut last_error = None;
        for addr in resolve_bind_addrs(host, port).await? {
            // Port 0 on several addresses must end up on one shared port
            let addr = SocketAddr::new(addr.ip(), port);
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let local_addr = listener
                        .local_addr()
                        .map_err(|e| Error::Listener(format!("reading bound address: {e}")))?;
                    port = local_addr.port();
                    listeners.push(listener);
                    local_addrs.push(local_addr);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    return Err(Error::Configuration(format!(
                        "cannot bind callback listener on {addr}: {e}"
                    )));
                }
                Err(e) => {
                    debug!(%addr, error = %e, "callback address not bindable, skipping");
                    last_error = Some(format!("cannot bind callback listener on {addr}: {e}"));
                }
            }
        }

        if listeners.is_empty() {
            return Err(Error::Configuration(last_error.unwrap_or_else(|| {
                format!("no address to bind for callback host {host:?}")
            })));
        }
        info!(addrs = ?local_addrs, path, "callback listener bound");
        Ok(Self {
            listeners,
            path: path.to_string(),
            local_addrs,
        })
    }

    /// First bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addrs[0]
    }

    /// Every bound address, all on the same port.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Serve until the first request on the redirect path, or until `timeout`.
    ///
    /// Requests on other paths get a 404 and do not complete the wait.
    pub async fn wait(self, timeout: Duration) -> Result<AuthorizationResult> {
        let (done_tx, done_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = CallbackState {
            completion: Arc::new(Mutex::new(Some(done_tx))),
        };
        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .with_state(state);

        let mut servers: Vec<JoinHandle<io::Result<()>>> = self
            .listeners
            .into_iter()
            .map(|listener| {
                let app = app.clone();
                let mut shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = shutdown_rx.wait_for(|stop| *stop).await;
                        })
                        .await
                })
            })
            .collect();

        let outcome = tokio::time::timeout(timeout, done_rx).await;

        // Tear down before returning so the port is free for the next attempt
        let _ = shutdown_tx.send(true);
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        for server in &mut servers {
            match tokio::time::timeout_at(deadline, &mut *server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(error = %e, "callback server error during shutdown"),
                Ok(Err(e)) => warn!(error = %e, "callback server task failed"),
                Err(_) => {
                    warn!("callback server did not drain in time, aborting");
                    server.abort();
                    let _ = server.await;
                }
            }
        }
        info!(addrs = ?self.local_addrs, "callback listener released");

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(Error::Listener(
                "server stopped before a redirect arrived".into(),
            )),
            Err(_) => Err(Error::AuthorizationTimedOut(timeout)),
        }
    }
}

/// Addresses to bind for a redirect host.
async fn resolve_bind_addrs(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(vec![
            SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            SocketAddr::from((Ipv6Addr::LOCALHOST, port)),
        ]);
    }
    let mut addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::Configuration(format!("cannot resolve callback host {host:?}: {e}")))?
        .collect();
    addrs.dedup();
    if addrs.is_empty() {
        return Err(Error::Configuration(format!(
            "callback host {host:?} resolved to no addresses"
        )));
    }
    Ok(addrs)
}

/// Bind, wait for one redirect, unbind.
pub async fn await_authorization(
    host: &str,
    port: u16,
    path: &str,
    timeout: Duration,
) -> Result<AuthorizationResult> {
    CallbackListener::bind(host, port, path).await?.wait(timeout).await
}

async fn handle_callback(
    State(state): State<CallbackState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let result = AuthorizationResult::from_query(query.as_deref());
    let page = render_page(&result);

    let sender = state
        .completion
        .lock()
        .ok()
        .and_then(|mut slot| slot.take());
    match sender {
        Some(tx) => {
            debug!(
                has_code = result.code.is_some(),
                has_error = result.error.is_some(),
                "authorization redirect received"
            );
            let _ = tx.send(result);
        }
        None => debug!("redirect after completion ignored"),
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CONNECTION, "close"),
        ],
        page,
    )
}

fn render_page(result: &AuthorizationResult) -> String {
    let message = match (&result.error, &result.code) {
        (Some(error), _) => format!("Spotify login failed: {}", escape_html(error)),
        (None, Some(_)) => "Done! You can close this window and return to the game.".to_string(),
        (None, None) => "No authorization code received.".to_string(),
    };
    format!(
        "<html><head><title>Spotify login</title></head>\
         <body style=\"font-family: Arial; background-color: #191414; color: #FFFFFF\">\
         <h2>{message}</h2></body></html>"
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
