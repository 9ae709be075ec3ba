//! OAuth2 authorization code flow with a loopback redirect
//!
//! [`OAuthFlow`] performs the provider-facing half of authorization. It
//! persists nothing; the [`AuthManager`](super::manager::AuthManager) decides
//! what to do with the records it returns.
//!
//! # Interactive flow
//!
//! 1. Generate a PKCE challenge and a random `state` token.
//! 2. Bind the redirect listener on `127.0.0.1:<redirect_port>`.
//! 3. Build the authorization URL and hand it to the [`AuthorizationPrompt`].
//! 4. Wait for the browser redirect, bounded by `callback_timeout`.
//!    Requests to other paths get `404` and the wait continues.
//! 5. Reject the callback unless `state` matches exactly.
//! 6. Exchange the code at the token endpoint.
//!
//! The listener is owned by the future awaiting the callback, so it is closed
//! on every exit path: success, CSRF mismatch, denial, timeout, or the caller
//! dropping the future.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::auth::client_secret::ClientSecret;
use crate::auth::pkce::{self, PkceChallenge};
use crate::auth::provider::{classify_error_response, classify_transport_error};
use crate::auth::scopes::ScopeSet;
use crate::auth::token_store::TokenRecord;
use crate::error::{AutoclerkError, Result};

/// Page shown in the browser once the code has been captured.
const SUCCESS_MESSAGE: &str = "Authentication successful! You may close this window.";

/// Upper bound on request-line and header bytes read from one connection.
const MAX_REQUEST_HEAD_BYTES: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// OAuthFlowConfig
// ---------------------------------------------------------------------------

/// Operator-tunable parameters of the flow.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use autoclerk::auth::flow::OAuthFlowConfig;
///
/// let config = OAuthFlowConfig {
///     redirect_port: 0,
///     callback_timeout: Duration::from_secs(5),
///     ..OAuthFlowConfig::default()
/// };
/// assert_eq!(config.redirect_path, "/");
/// ```
#[derive(Debug, Clone)]
pub struct OAuthFlowConfig {
    /// Local TCP port for the redirect listener. `0` lets the OS choose.
    pub redirect_port: u16,

    /// Path the provider redirects to.
    pub redirect_path: String,

    /// How long to wait for the browser redirect.
    pub callback_timeout: Duration,

    /// Extra attempts made when the token endpoint is unreachable.
    pub network_retries: u32,

    /// Delay before the first retry; doubled on each further retry.
    pub retry_backoff: Duration,
}

impl Default for OAuthFlowConfig {
    fn default() -> Self {
        Self {
            redirect_port: 8080,
            redirect_path: "/".to_string(),
            callback_timeout: Duration::from_secs(300),
            network_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthorizationPrompt
// ---------------------------------------------------------------------------

/// Directs the user to the authorization URL.
pub trait AuthorizationPrompt: Send + Sync {
    /// Called once per authorization attempt, after the loopback listener is
    /// bound and before the flow starts waiting for the redirect.
    fn present(&self, authorization_url: &Url);
}

/// Prints the authorization URL to stderr and optionally launches the
/// system browser.
#[derive(Debug, Clone, Default)]
pub struct ConsolePrompt {
    /// Also launch the platform's URL opener.
    pub open_browser: bool,
}

impl AuthorizationPrompt for ConsolePrompt {
    fn present(&self, authorization_url: &Url) {
        eprintln!(
            "Open the following URL in your browser to authorize Autoclerk:\n{}",
            authorization_url
        );
        if self.open_browser {
            try_open_browser(authorization_url.as_str());
        }
    }
}

/// Errors are ignored; the URL has already been printed.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(target_os = "windows")]
    {
        let _ = std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = url;
    }
}

// ---------------------------------------------------------------------------
// Token endpoint response
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Converts the response into a record. Fields the provider omitted fall
    /// back to `previous` (refresh) or the requested scopes (RFC 6749 §5.1).
    fn into_record(self, requested: &ScopeSet, previous: Option<&TokenRecord>) -> TokenRecord {
        let expires_at = self.expires_in.and_then(expiry_from_lifetime);

        let scopes = match self.scope.as_deref() {
            Some(raw) if !raw.trim().is_empty() => ScopeSet::from_space_delimited(raw),
            _ => previous
                .map(|p| p.scopes.clone())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| requested.clone()),
        };

        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));

        TokenRecord {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token,
            expires_at,
            scopes,
        }
    }
}

/// Absolute expiry for a lifetime of `secs` seconds from now. A lifetime too
/// large to represent is treated as non-expiring.
fn expiry_from_lifetime(secs: u64) -> Option<chrono::DateTime<chrono::Utc>> {
    let expires_at = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| chrono::Utc::now().checked_add_signed(lifetime));
    if expires_at.is_none() {
        tracing::warn!(expires_in = secs, "Token lifetime out of range; treating as non-expiring");
    }
    expires_at
}

/// Query parameters delivered to the redirect path.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// OAuthFlow
// ---------------------------------------------------------------------------

/// Drives authorization and refresh exchanges for one client.
pub struct OAuthFlow {
    http: Arc<reqwest::Client>,
    client: Arc<ClientSecret>,
    config: OAuthFlowConfig,
    prompt: Arc<dyn AuthorizationPrompt>,
}

impl OAuthFlow {
    /// Creates a flow for one client.
    ///
    /// # Arguments
    ///
    /// * `http` - Client used for token endpoint requests
    /// * `client` - Validated client identity and provider endpoints
    /// * `config` - Listener, timeout and retry settings
    /// * `prompt` - Where the authorization URL is shown to the user
    pub fn new(
        http: Arc<reqwest::Client>,
        client: Arc<ClientSecret>,
        config: OAuthFlowConfig,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Self {
        Self {
            http,
            client,
            config,
            prompt,
        }
    }

    /// Runs the interactive authorization code flow for `scopes`.
    ///
    /// # Errors
    ///
    /// - [`AutoclerkError::CsrfMismatch`] if the callback `state` differs.
    /// - [`AutoclerkError::AuthorizationTimeout`] if no callback arrives in
    ///   time.
    /// - [`AutoclerkError::AuthorizationDenied`] if the provider redirects
    ///   with `error=`.
    /// - Token endpoint failures as classified by
    ///   [`classify_error_response`].
    pub async fn authorize(&self, scopes: &ScopeSet) -> Result<TokenRecord> {
        let pkce_challenge = PkceChallenge::generate();
        let state = pkce::generate_state();

        let listener = TcpListener::bind(("127.0.0.1", self.config.redirect_port))
            .await
            .map_err(|e| {
                AutoclerkError::Network(format!(
                    "failed to bind redirect listener on port {}: {e}",
                    self.config.redirect_port
                ))
            })?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://localhost:{}{}", port, self.config.redirect_path);

        let auth_url = self.build_authorization_url(
            &redirect_uri,
            scopes,
            &state,
            &pkce_challenge.challenge,
        );
        tracing::info!(port, scopes = %scopes, "Waiting for authorization callback");
        self.prompt.present(&auth_url);

        let timeout = self.config.callback_timeout;
        let code = tokio::time::timeout(
            timeout,
            accept_callback(listener, &self.config.redirect_path, &state),
        )
        .await
        .map_err(|_| AutoclerkError::AuthorizationTimeout {
            seconds: timeout.as_secs(),
        })??;

        tracing::debug!("Authorization code received; exchanging for tokens");
        self.exchange_code(&code, &redirect_uri, &pkce_challenge.verifier, scopes)
            .await
    }

    /// Exchanges the record's refresh token for a new access token.
    ///
    /// The returned record keeps the previous refresh token and scopes when
    /// the provider omits them.
    pub async fn refresh(&self, record: &TokenRecord) -> Result<TokenRecord> {
        let refresh_token = record.refresh_token.as_deref().ok_or_else(|| {
            AutoclerkError::TokenExchange("token record has no refresh token".to_string())
        })?;

        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client.client_id.as_str()),
        ];
        if let Some(secret) = self.client.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self.post_token_request(&params, "refresh").await?;
        Ok(response.into_record(&record.scopes, Some(record)))
    }

    /// Builds the provider authorization URL.
    pub fn build_authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &ScopeSet,
        state: &str,
        code_challenge: &str,
    ) -> Url {
        let mut url = self.client.auth_uri.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.to_space_delimited())
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", PkceChallenge::METHOD)
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true");
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        requested: &ScopeSet,
    ) -> Result<TokenRecord> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = self.client.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self.post_token_request(&params, "code exchange").await?;
        Ok(response.into_record(requested, None))
    }

    /// POSTs a form to the token endpoint, retrying network failures up to
    /// `network_retries` times with exponential backoff.
    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> Result<TokenResponse> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_post_token_request(params, operation).await {
                Err(e) if e.is_retryable() && attempt < self.config.network_retries => {
                    let delay = self
                        .config
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.config.network_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Token endpoint unreachable: {}. Retrying",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other.map_err(Into::into),
            }
        }
    }

    async fn try_post_token_request(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> std::result::Result<TokenResponse, AutoclerkError> {
        let resp = self
            .http
            .post(self.client.token_uri.clone())
            .form(params)
            .send()
            .await
            .map_err(|e| classify_transport_error(&format!("{operation} request failed"), &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_error_response(status, &body));
        }

        resp.json().await.map_err(|e| {
            AutoclerkError::TokenExchange(format!("failed to parse {operation} response: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Redirect listener
// ---------------------------------------------------------------------------

/// Accepts connections until one hits `redirect_path`, then validates it and
/// returns the authorization code.
async fn accept_callback(
    listener: TcpListener,
    redirect_path: &str,
    expected_state: &str,
) -> Result<String> {
    loop {
        let (mut stream, peer) = listener.accept().await.map_err(|e| {
            AutoclerkError::Network(format!("failed to accept callback connection: {e}"))
        })?;

        let target = match read_request_target(&mut stream).await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(%peer, "Ignoring unreadable callback connection: {}", e);
                continue;
            }
        };

        let Some(params) = parse_callback_target(&target, redirect_path) else {
            respond(&mut stream, "404 Not Found", "Not found").await;
            continue;
        };

        match validate_callback(params, expected_state) {
            Ok(code) => {
                respond(&mut stream, "200 OK", SUCCESS_MESSAGE).await;
                return Ok(code);
            }
            Err(e) => {
                respond(&mut stream, "400 Bad Request", &format!("Authorization failed: {e}"))
                    .await;
                return Err(e.into());
            }
        }
    }
}

/// Reads the request head and returns the request target of the first line.
async fn read_request_target(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    let mut read = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        read += n;
        if n == 0 || read > MAX_REQUEST_HEAD_BYTES {
            break;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if request_line.is_empty() {
            request_line = trimmed.to_string();
        }
    }

    // "GET /?code=...&state=... HTTP/1.1"
    request_line
        .split_whitespace()
        .nth(1)
        .map(str::to_owned)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "empty request"))
}

/// Returns the callback parameters when `target` addresses `redirect_path`.
fn parse_callback_target(target: &str, redirect_path: &str) -> Option<CallbackParams> {
    let url = Url::parse("http://localhost").ok()?.join(target).ok()?;
    if url.path() != redirect_path {
        return None;
    }

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        let value = Some(value.into_owned());
        match key.as_ref() {
            "code" => params.code = value,
            "state" => params.state = value,
            "error" => params.error = value,
            "error_description" => params.error_description = value,
            _ => {}
        }
    }
    Some(params)
}

fn validate_callback(
    params: CallbackParams,
    expected_state: &str,
) -> std::result::Result<String, AutoclerkError> {
    if params.state.as_deref() != Some(expected_state) {
        tracing::warn!("Authorization callback carried an unexpected state token");
        return Err(AutoclerkError::CsrfMismatch);
    }

    if let Some(error) = params.error {
        let detail = match params.error_description {
            Some(desc) => format!("{error}: {desc}"),
            None => error,
        };
        return Err(AutoclerkError::AuthorizationDenied(detail));
    }

    params.code.filter(|c| !c.is_empty()).ok_or_else(|| {
        AutoclerkError::AuthorizationDenied("callback did not include an authorization code".into())
    })
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
