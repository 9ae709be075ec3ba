use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use url::Url;

use autoclerk::auth::client_secret::ClientSecret;
use autoclerk::auth::flow::{AuthorizationPrompt, OAuthFlow, OAuthFlowConfig};
use autoclerk::auth::token_store::{TokenRecord, TokenStorage};
use autoclerk::{AuthManager, AutoclerkError, ScopeSet};

#[allow(dead_code)]
pub const DOCS: &str = "https://www.googleapis.com/auth/documents";
#[allow(dead_code)]
pub const DRIVE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Forwards every authorization URL to the test body.
#[allow(dead_code)]
pub struct ChannelPrompt {
    tx: mpsc::UnboundedSender<Url>,
}

impl AuthorizationPrompt for ChannelPrompt {
    fn present(&self, authorization_url: &Url) {
        let _ = self.tx.send(authorization_url.clone());
    }
}

/// Fails the test if the interactive flow starts.
#[allow(dead_code)]
pub struct PanickingPrompt;

impl AuthorizationPrompt for PanickingPrompt {
    fn present(&self, authorization_url: &Url) {
        panic!("unexpected interactive authorization: {authorization_url}");
    }
}

#[allow(dead_code)]
pub fn channel_prompt() -> (Arc<ChannelPrompt>, mpsc::UnboundedReceiver<Url>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelPrompt { tx }), rx)
}

/// Client secret whose endpoints live on the mock server at `base_url`.
#[allow(dead_code)]
pub fn client_secret(base_url: &str) -> ClientSecret {
    ClientSecret::from_json(&format!(
        r#"{{"installed": {{
            "client_id": "test-client.apps.googleusercontent.com",
            "client_secret": "test-secret",
            "auth_uri": "{base_url}/o/oauth2/auth",
            "token_uri": "{base_url}/token"
        }}}}"#
    ))
    .expect("valid client secret")
}

/// Flow parameters suitable for tests: ephemeral port, short timeout.
#[allow(dead_code)]
pub fn test_flow_config() -> OAuthFlowConfig {
    OAuthFlowConfig {
        redirect_port: 0,
        callback_timeout: Duration::from_secs(10),
        retry_backoff: Duration::from_millis(10),
        ..OAuthFlowConfig::default()
    }
}

/// Client that never routes loopback traffic through a proxy.
#[allow(dead_code)]
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client")
}

#[allow(dead_code)]
pub fn make_manager(
    base_url: &str,
    config: OAuthFlowConfig,
    prompt: Arc<dyn AuthorizationPrompt>,
    storage: Arc<dyn TokenStorage>,
) -> AuthManager {
    let flow = OAuthFlow::new(
        Arc::new(http_client()),
        Arc::new(client_secret(base_url)),
        config,
        prompt,
    );
    AuthManager::new(flow, storage)
}

#[allow(dead_code)]
pub fn scopes(list: &[&str]) -> ScopeSet {
    list.iter().copied().collect()
}

#[allow(dead_code)]
pub fn record(access: &str, refresh: Option<&str>, expires_in: i64, list: &[&str]) -> TokenRecord {
    TokenRecord {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_at: Some(Utc::now() + chrono::Duration::seconds(expires_in)),
        scopes: scopes(list),
    }
}

#[allow(dead_code)]
pub fn token_body(access: &str, refresh: Option<&str>, scope: &str) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": scope,
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::Value::String(refresh.to_string());
    }
    body
}

/// Returns the value of query parameter `name` in `url`.
#[allow(dead_code)]
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Base URL of the redirect listener announced in the authorization URL,
/// rewritten to the loopback address the listener is bound to.
#[allow(dead_code)]
pub fn redirect_target(authorization_url: &Url) -> Url {
    let redirect = query_param(authorization_url, "redirect_uri").expect("redirect_uri");
    let mut target = Url::parse(&redirect).expect("valid redirect_uri");
    target.set_host(Some("127.0.0.1")).expect("set host");
    target
}

/// Simulates the browser redirect with arbitrary query parameters.
#[allow(dead_code)]
pub async fn send_redirect(authorization_url: &Url, pairs: &[(&str, &str)]) -> reqwest::Response {
    let mut target = redirect_target(authorization_url);
    {
        let mut query = target.query_pairs_mut();
        for (k, v) in pairs {
            query.append_pair(k, v);
        }
    }
    http_client()
        .get(target)
        .send()
        .await
        .expect("callback request")
}

/// Simulates a successful browser redirect carrying `code` and the state
/// from the authorization URL.
#[allow(dead_code)]
pub async fn approve(authorization_url: &Url, code: &str) -> reqwest::Response {
    let state = query_param(authorization_url, "state").expect("state");
    send_redirect(authorization_url, &[("code", code), ("state", &state)]).await
}

#[allow(dead_code)]
pub fn as_autoclerk(err: &anyhow::Error) -> &AutoclerkError {
    err.downcast_ref::<AutoclerkError>()
        .unwrap_or_else(|| panic!("expected AutoclerkError, got: {err:#}"))
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
