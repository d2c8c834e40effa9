//! Credential lifecycle controller
//!
//! `Authenticator` drives the whole flow: PKCE generation, the local redirect
//! listener, the browser hand-off, code exchange, and refresh-before-expiry.
//!
//! Concurrency rules:
//! - one login at a time; a second concurrent `login()` fails with `LoginInProgress`
//! - at most one refresh in flight; callers that find the token expiring queue
//!   on `refresh_lock` and re-check the store once they get it, so a burst of
//!   commands produces a single refresh request

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::callback::CallbackListener;
use crate::config::AuthConfig;
use crate::constants::REFRESH_MARGIN;
use crate::error::{Error, Result};
use crate::pkce::{PkceMaterial, build_authorization_url};
use crate::store::{Credential, TokenStore, now_millis};
use crate::token::{Grant, request_token};

/// Source of a currently valid bearer token.
///
/// Uses `Pin<Box<dyn Future>>` so callers can hold an `Arc<dyn AccessTokenSource>`.
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + '_>>;
}

pub struct Authenticator {
    config: AuthConfig,
    http_client: reqwest::Client,
    store: Arc<TokenStore>,
    browser: Arc<dyn BrowserLauncher>,
    login_lock: Mutex<()>,
    refresh_lock: Mutex<()>,
}

impl Authenticator {
    /// Authenticator that opens the system browser during login.
    pub fn new(config: AuthConfig, http_client: reqwest::Client, store: Arc<TokenStore>) -> Self {
        Self {
            config,
            http_client,
            store,
            browser: Arc::new(SystemBrowser),
            login_lock: Mutex::new(()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Replace how the authorization URL is surfaced.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Run the full authorization code + PKCE flow and store the result.
    ///
    /// Blocks until the browser redirects back, the callback timeout elapses,
    /// or a step fails. A denied or empty redirect never reaches the token
    /// endpoint.
    pub async fn login(&self) -> Result<Credential> {
        let _login = self.login_lock.try_lock().map_err(|_| Error::LoginInProgress)?;

        let target = self.config.redirect_target()?;
        let pkce = PkceMaterial::generate();
        let listener = CallbackListener::bind(&target.host, target.port, &target.path).await?;

        let url = build_authorization_url(&self.config, &pkce.challenge);
        debug!(%url, "authorization URL built");
        self.browser.open(&url);

        let result = listener.wait(self.config.callback_timeout()).await?;
        let code = result.into_code().inspect_err(|e| warn!(error = %e, "login aborted"))?;

        let grant = request_token(
            &self.http_client,
            &self.config,
            Grant::AuthorizationCode {
                code: &code,
                redirect_uri: &self.config.redirect_uri,
                verifier: pkce.verifier.expose(),
            },
        )
        .await?;
        let credential = self.store.apply_grant(grant).await;
        info!(
            expires_in_secs = credential.remaining(now_millis()).as_secs(),
            "login complete"
        );
        Ok(credential)
    }

    /// The stored credential, refreshed first if it expires within 30 seconds.
    pub async fn ensure_valid(&self) -> Result<Credential> {
        let credential = self.store.get().await.ok_or(Error::NotAuthenticated)?;
        if !credential.expires_within(REFRESH_MARGIN, now_millis()) {
            return Ok(credential);
        }

        let _refresh = self.refresh_lock.lock().await;
        let credential = self.store.get().await.ok_or(Error::NotAuthenticated)?;
        if !credential.expires_within(REFRESH_MARGIN, now_millis()) {
            debug!("token already refreshed by a concurrent caller");
            return Ok(credential);
        }
        self.refresh_from(&credential).await
    }

    /// Refresh now, regardless of expiry.
    pub async fn refresh(&self) -> Result<Credential> {
        let _refresh = self.refresh_lock.lock().await;
        let credential = self.store.get().await.ok_or(Error::NotAuthenticated)?;
        self.refresh_from(&credential).await
    }

    /// Peek at the stored credential without validating it.
    pub async fn credential(&self) -> Option<Credential> {
        self.store.get().await
    }

    /// Drop the stored credential. The next command fails with `NotAuthenticated`.
    pub async fn logout(&self) {
        if self.store.clear().await.is_some() {
            info!("logged out");
        }
    }

    /// Caller must hold `refresh_lock`. On failure the store is left untouched.
    async fn refresh_from(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_ref()
            .ok_or(Error::MissingRefreshToken)?;
        debug!("refreshing access token");
        let grant = request_token(
            &self.http_client,
            &self.config,
            Grant::RefreshToken {
                refresh_token: refresh_token.expose(),
            },
        )
        .await?;
        Ok(self.store.apply_grant(grant).await)
    }
}

impl AccessTokenSource for Authenticator {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + '_>> {
        Box::pin(async move { Ok(self.ensure_valid().await?.access_token) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::query_param;
    use crate::pkce::compute_challenge;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::Notify;

    const TOKENS: &str = r#"{"access_token":"tok1","token_type":"Bearer","refresh_token":"ref1","expires_in":3600}"#;
    const REFRESHED: &str = r#"{"access_token":"tok2","token_type":"Bearer","expires_in":3600}"#;

    #[derive(Clone)]
    struct TokenServer {
        status: StatusCode,
        body: &'static str,
        delay: Duration,
        forms: Arc<StdMutex<Vec<String>>>,
    }

    async fn token_handler(State(server): State<TokenServer>, form: String) -> (StatusCode, &'static str) {
        server.forms.lock().unwrap().push(form);
        tokio::time::sleep(server.delay).await;
        (server.status, server.body)
    }

    /// Start a token endpoint stub. Returns its URL and the form bodies it received.
    async fn start_token_server(
        status: StatusCode,
        body: &'static str,
        delay: Duration,
    ) -> (String, Arc<StdMutex<Vec<String>>>) {
        let forms = Arc::new(StdMutex::new(Vec::new()));
        let state = TokenServer {
            status,
            body,
            delay,
            forms: forms.clone(),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/api/token", post(token_handler))
            .with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/api/token"), forms)
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// Plays the user's browser: records the URL, then follows the redirect
    /// with `query` appended.
    struct RedirectingBrowser {
        redirect: String,
        opened: StdMutex<Vec<String>>,
    }

    impl RedirectingBrowser {
        fn new(redirect_uri: &str, query: &str) -> Arc<Self> {
            Arc::new(Self {
                redirect: format!("{redirect_uri}?{query}"),
                opened: StdMutex::new(Vec::new()),
            })
        }
    }

    impl BrowserLauncher for RedirectingBrowser {
        fn open(&self, url: &str) {
            self.opened.lock().unwrap().push(url.to_string());
            let redirect = self.redirect.clone();
            tokio::spawn(async move {
                let _ = reqwest::get(redirect).await;
            });
        }
    }

    /// Signals when the authorization URL is surfaced, never redirects.
    #[derive(Default)]
    struct IdleBrowser {
        opened: Notify,
    }

    impl BrowserLauncher for IdleBrowser {
        fn open(&self, _url: &str) {
            self.opened.notify_one();
        }
    }

    fn login_config(token_endpoint: &str) -> AuthConfig {
        AuthConfig::new("test-client")
            .with_redirect_uri(format!("http://127.0.0.1:{}/callback", free_port()))
            .with_token_endpoint(token_endpoint)
            .with_callback_timeout(Duration::from_secs(10))
    }

    fn authenticator(config: AuthConfig) -> Authenticator {
        Authenticator::new(config, reqwest::Client::new(), Arc::new(TokenStore::new()))
    }

    /// Authenticator whose store holds `tok0`/`ref0` expiring `expires_in_ms` from now.
    async fn seeded(token_endpoint: &str, expires_in_ms: i64, refresh: bool) -> Authenticator {
        let auth = authenticator(AuthConfig::new("test-client").with_token_endpoint(token_endpoint));
        let expires_at = (now_millis() as i64 + expires_in_ms).max(0) as u64;
        auth.store()
            .replace(Credential {
                access_token: Secret::new("tok0".into()),
                refresh_token: refresh.then(|| Secret::new("ref0".into())),
                expires_at,
            })
            .await;
        auth
    }

    #[tokio::test]
    async fn login_exchanges_code_and_stores_credential() {
        let (endpoint, forms) = start_token_server(StatusCode::OK, TOKENS, Duration::ZERO).await;
        let config = login_config(&endpoint);
        let browser = RedirectingBrowser::new(&config.redirect_uri, "code=ABC123");
        let auth = authenticator(config.clone()).with_browser(browser.clone());

        let before = now_millis();
        let credential = auth.login().await.unwrap();

        assert_eq!(credential.access_token.expose(), "tok1");
        assert_eq!(credential.refresh_token.as_ref().unwrap().expose(), "ref1");
        assert!(credential.expires_at >= before + 3_600_000);
        assert!(credential.expires_at <= now_millis() + 3_600_000);
        assert_eq!(auth.credential().await, Some(credential));

        let forms = forms.lock().unwrap();
        assert_eq!(forms.len(), 1);
        let form = &forms[0];
        assert_eq!(query_param(form, "grant_type").as_deref(), Some("authorization_code"));
        assert_eq!(query_param(form, "code").as_deref(), Some("ABC123"));
        assert_eq!(query_param(form, "client_id").as_deref(), Some("test-client"));
        assert_eq!(query_param(form, "redirect_uri"), Some(config.redirect_uri.clone()));

        // The verifier sent to the token endpoint matches the challenge the browser saw
        let opened = browser.opened.lock().unwrap();
        let (_, query) = opened[0].split_once('?').unwrap();
        let verifier = query_param(form, "code_verifier").unwrap();
        assert_eq!(
            query_param(query, "code_challenge"),
            Some(compute_challenge(&verifier))
        );
        assert_eq!(query_param(query, "code_challenge_method").as_deref(), Some("S256"));
    }

    #[tokio::test]
    async fn login_through_ipv6_loopback_redirect() {
        let (endpoint, forms) = start_token_server(StatusCode::OK, TOKENS, Duration::ZERO).await;
        let port = std::net::TcpListener::bind("[::1]:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = AuthConfig::new("test-client")
            .with_redirect_uri(format!("http://[::1]:{port}/callback"))
            .with_token_endpoint(&endpoint)
            .with_callback_timeout(Duration::from_secs(10));
        let browser = RedirectingBrowser::new(&config.redirect_uri, "code=ABC123");
        let auth = authenticator(config).with_browser(browser);

        let credential = auth.login().await.unwrap();
        assert_eq!(credential.access_token.expose(), "tok1");
        let forms = forms.lock().unwrap();
        assert_eq!(query_param(&forms[0], "code").as_deref(), Some("ABC123"));
    }

    #[tokio::test]
    async fn each_login_uses_a_fresh_verifier() {
        let (endpoint, forms) = start_token_server(StatusCode::OK, TOKENS, Duration::ZERO).await;
        let config = login_config(&endpoint);
        let browser = RedirectingBrowser::new(&config.redirect_uri, "code=ABC123");
        let auth = authenticator(config).with_browser(browser);

        auth.login().await.unwrap();
        auth.login().await.unwrap();

        let forms = forms.lock().unwrap();
        assert_eq!(forms.len(), 2);
        assert_ne!(
            query_param(&forms[0], "code_verifier"),
            query_param(&forms[1], "code_verifier")
        );
    }

    #[tokio::test]
    async fn denied_login_makes_no_token_request() {
        let (endpoint, forms) = start_token_server(StatusCode::OK, TOKENS, Duration::ZERO).await;
        let config = login_config(&endpoint);
        let browser = RedirectingBrowser::new(&config.redirect_uri, "error=access_denied");
        let auth = authenticator(config).with_browser(browser);

        let err = auth.login().await.unwrap_err();
        assert!(
            matches!(&err, Error::AuthorizationDenied(e) if e == "access_denied"),
            "got {err:?}"
        );
        assert!(forms.lock().unwrap().is_empty());
        assert!(auth.credential().await.is_none());
    }

    #[tokio::test]
    async fn empty_redirect_is_no_authorization_code() {
        let (endpoint, forms) = start_token_server(StatusCode::OK, TOKENS, Duration::ZERO).await;
        let config = login_config(&endpoint);
        let browser = RedirectingBrowser::new(&config.redirect_uri, "state=unused");
        let auth = authenticator(config).with_browser(browser);

        let err = auth.login().await.unwrap_err();
        assert!(matches!(err, Error::NoAuthorizationCode), "got {err:?}");
        assert!(forms.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_exchange_surfaces_status_and_body() {
        let (endpoint, _) = start_token_server(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#,
            Duration::ZERO,
        )
        .await;
        let config = login_config(&endpoint);
        let browser = RedirectingBrowser::new(&config.redirect_uri, "code=stale");
        let auth = authenticator(config).with_browser(browser);

        match auth.login().await.unwrap_err() {
            Error::TokenRequestFailed { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected TokenRequestFailed, got {other:?}"),
        }
        assert!(auth.credential().await.is_none());
    }

    #[tokio::test]
    async fn exchange_without_access_token_is_malformed() {
        let (endpoint, _) =
            start_token_server(StatusCode::OK, r#"{"token_type":"Bearer"}"#, Duration::ZERO).await;
        let config = login_config(&endpoint);
        let browser = RedirectingBrowser::new(&config.redirect_uri, "code=ABC123");
        let auth = authenticator(config).with_browser(browser);

        let err = auth.login().await.unwrap_err();
        assert!(matches!(err, Error::TokenResponseMalformed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn redirect_without_port_fails_before_browser() {
        let browser = Arc::new(IdleBrowser::default());
        let auth = authenticator(
            AuthConfig::new("test-client").with_redirect_uri("http://localhost/callback"),
        )
        .with_browser(browser.clone());

        let err = auth.login().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn second_concurrent_login_fails_fast() {
        let (endpoint, _) = start_token_server(StatusCode::OK, TOKENS, Duration::ZERO).await;
        let config = login_config(&endpoint);
        let redirect = config.redirect_uri.clone();
        let browser = Arc::new(IdleBrowser::default());
        let auth = Arc::new(authenticator(config).with_browser(browser.clone()));

        let first = tokio::spawn({
            let auth = auth.clone();
            async move { auth.login().await }
        });
        browser.opened.notified().await;

        let err = auth.login().await.unwrap_err();
        assert!(matches!(err, Error::LoginInProgress), "got {err:?}");

        reqwest::get(format!("{redirect}?code=ABC123")).await.unwrap();
        let credential = first.await.unwrap().unwrap();
        assert_eq!(credential.access_token.expose(), "tok1");
    }

    #[tokio::test]
    async fn abandoned_login_times_out_and_frees_the_port() {
        let config = AuthConfig::new("test-client")
            .with_redirect_uri(format!("http://127.0.0.1:{}/callback", free_port()))
            .with_callback_timeout(Duration::from_secs(1));
        let target = config.redirect_target().unwrap();
        let auth = authenticator(config).with_browser(Arc::new(IdleBrowser::default()));

        let err = auth.login().await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationTimedOut(_)), "got {err:?}");
        CallbackListener::bind(&target.host, target.port, &target.path)
            .await
            .expect("port must be free after timeout");
    }

    #[tokio::test]
    async fn ensure_valid_without_login_is_not_authenticated() {
        let auth = authenticator(AuthConfig::new("test-client"));
        let err = auth.ensure_valid().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }

    #[tokio::test]
    async fn ensure_valid_far_from_expiry_makes_no_request() {
        let (endpoint, forms) =
            start_token_server(StatusCode::OK, REFRESHED, Duration::ZERO).await;
        let auth = seeded(&endpoint, 3_600_000, true).await;
        let stored = auth.credential().await.unwrap();

        let credential = auth.ensure_valid().await.unwrap();
        assert_eq!(credential, stored);
        assert!(forms.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ensure_valid_inside_margin_refreshes_once() {
        let (endpoint, forms) =
            start_token_server(StatusCode::OK, REFRESHED, Duration::ZERO).await;
        let auth = seeded(&endpoint, 10_000, true).await;

        let credential = auth.ensure_valid().await.unwrap();
        assert_eq!(credential.access_token.expose(), "tok2");
        // Refresh response had no refresh_token, the old one is kept
        assert_eq!(credential.refresh_token.as_ref().unwrap().expose(), "ref0");
        assert!(credential.expires_at > now_millis() + 3_500_000);

        let forms = forms.lock().unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(query_param(&forms[0], "grant_type").as_deref(), Some("refresh_token"));
        assert_eq!(query_param(&forms[0], "refresh_token").as_deref(), Some("ref0"));
        assert_eq!(query_param(&forms[0], "client_id").as_deref(), Some("test-client"));
    }

    #[tokio::test]
    async fn ensure_valid_after_expiry_refreshes() {
        let (endpoint, forms) =
            start_token_server(StatusCode::OK, REFRESHED, Duration::ZERO).await;
        let auth = seeded(&endpoint, -60_000, true).await;

        let credential = auth.ensure_valid().await.unwrap();
        assert_eq!(credential.access_token.expose(), "tok2");
        assert_eq!(forms.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expiring_without_refresh_token_fails() {
        let (endpoint, forms) =
            start_token_server(StatusCode::OK, REFRESHED, Duration::ZERO).await;
        let auth = seeded(&endpoint, 5_000, false).await;

        let err = auth.ensure_valid().await.unwrap_err();
        assert!(matches!(err, Error::MissingRefreshToken), "got {err:?}");
        assert!(forms.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_leaves_credential_untouched() {
        let (endpoint, _) = start_token_server(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant"}"#,
            Duration::ZERO,
        )
        .await;
        let auth = seeded(&endpoint, 5_000, true).await;
        let before = auth.credential().await.unwrap();

        let err = auth.ensure_valid().await.unwrap_err();
        assert!(matches!(err, Error::TokenRequestFailed { status: 400, .. }));
        assert_eq!(auth.credential().await, Some(before));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let (endpoint, forms) =
            start_token_server(StatusCode::OK, REFRESHED, Duration::from_millis(100)).await;
        let auth = Arc::new(seeded(&endpoint, 1_000, true).await);

        let mut handles = vec![];
        for _ in 0..8 {
            let auth = auth.clone();
            handles.push(tokio::spawn(async move { auth.ensure_valid().await }));
        }
        for h in handles {
            let credential = h.await.unwrap().unwrap();
            assert_eq!(credential.access_token.expose(), "tok2");
        }
        assert_eq!(forms.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn forced_refresh_ignores_expiry() {
        let (endpoint, forms) =
            start_token_server(StatusCode::OK, REFRESHED, Duration::ZERO).await;
        let auth = seeded(&endpoint, 3_600_000, true).await;

        let credential = auth.refresh().await.unwrap();
        assert_eq!(credential.access_token.expose(), "tok2");
        assert_eq!(forms.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn access_token_source_yields_bearer_token() {
        let (endpoint, _) = start_token_server(StatusCode::OK, REFRESHED, Duration::ZERO).await;
        let auth: Arc<dyn AccessTokenSource> = Arc::new(seeded(&endpoint, 3_600_000, true).await);
        let token = auth.access_token().await.unwrap();
        assert_eq!(token.expose(), "tok0");
    }

    #[tokio::test]
    async fn logout_clears_store() {
        let (endpoint, _) = start_token_server(StatusCode::OK, REFRESHED, Duration::ZERO).await;
        let auth = seeded(&endpoint, 3_600_000, true).await;
        auth.logout().await;
        assert!(matches!(
            auth.ensure_valid().await.unwrap_err(),
            Error::NotAuthenticated
        ));
    }
}
