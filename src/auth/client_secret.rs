//! Client secret descriptor loading
//!
//! The provider issues the application identity out-of-band as a JSON file.
//! Google wraps the fields in an `installed` (desktop) or `web` object:
//!
//! ```json
//! {"installed": {"client_id": "...", "client_secret": "...",
//!                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
//!                "token_uri": "https://oauth2.googleapis.com/token",
//!                "redirect_uris": ["http://localhost"]}}
//! ```
//!
//! Anything that cannot be used to run the authorization-code flow is
//! reported as [`AutoclerkError::InvalidClientSecret`].

use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{AutoclerkError, Result};

/// Validated application identity used by the authorization flow.
#[derive(Clone)]
pub struct ClientSecret {
    pub client_id: String,

    /// Absent for public clients, which rely on PKCE alone.
    pub client_secret: Option<String>,

    /// Provider authorization endpoint the browser is sent to.
    pub auth_uri: Url,

    /// Endpoint for code and refresh exchanges.
    pub token_uri: Url,

    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(default)]
    installed: Option<RawClientSecret>,
    #[serde(default)]
    web: Option<RawClientSecret>,
}

#[derive(Debug, Deserialize)]
struct RawClientSecret {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    auth_uri: String,
    #[serde(default)]
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientSecret {
    /// Reads and validates a client secret file.
    ///
    /// # Errors
    ///
    /// Returns [`AutoclerkError::InvalidClientSecret`] if the file is
    /// missing, is not valid JSON, or fails [`ClientSecret::from_json`]
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AutoclerkError::InvalidClientSecret(format!(
                "cannot read client secret file {}: {e}",
                path.display()
            ))
        })?;
        let secret = Self::from_json(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded client secret");
        Ok(secret)
    }

    /// Parses and validates a client secret descriptor.
    ///
    /// # Examples
    ///
    /// ```
    /// use autoclerk::auth::client_secret::ClientSecret;
    ///
    /// let json = r#"{"installed": {
    ///     "client_id": "abc.apps.googleusercontent.com",
    ///     "client_secret": "shh",
    ///     "auth_uri": "https://accounts.google.com/o/oauth2/auth",
    ///     "token_uri": "https://oauth2.googleapis.com/token",
    ///     "redirect_uris": ["http://localhost"]
    /// }}"#;
    /// let secret = ClientSecret::from_json(json).unwrap();
    /// assert_eq!(secret.client_id, "abc.apps.googleusercontent.com");
    /// ```
    pub fn from_json(contents: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(contents).map_err(|e| {
            AutoclerkError::InvalidClientSecret(format!("malformed client secret JSON: {e}"))
        })?;

        let raw = file.installed.or(file.web).ok_or_else(|| {
            AutoclerkError::InvalidClientSecret(
                "expected an \"installed\" or \"web\" client descriptor".to_string(),
            )
        })?;

        Self::validate(raw)
    }

    fn validate(raw: RawClientSecret) -> Result<Self> {
        if raw.client_id.trim().is_empty() {
            return Err(
                AutoclerkError::InvalidClientSecret("client_id is empty".to_string()).into(),
            );
        }

        let auth_uri = parse_endpoint("auth_uri", &raw.auth_uri)?;
        let token_uri = parse_endpoint("token_uri", &raw.token_uri)?;

        if !raw.redirect_uris.is_empty() && !raw.redirect_uris.iter().any(|u| is_loopback(u)) {
            return Err(AutoclerkError::InvalidClientSecret(
                "no loopback redirect URI is authorized for this client".to_string(),
            )
            .into());
        }

        Ok(Self {
            client_id: raw.client_id,
            client_secret: raw.client_secret.filter(|s| !s.is_empty()),
            auth_uri,
            token_uri,
            redirect_uris: raw.redirect_uris,
        })
    }
}

// Keeps the client secret out of logs.
impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_uri", &self.auth_uri.as_str())
            .field("token_uri", &self.token_uri.as_str())
            .field("redirect_uris", &self.redirect_uris)
            .finish()
    }
}

fn parse_endpoint(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| {
        AutoclerkError::InvalidClientSecret(format!("{field} is not a valid URL ({value:?}): {e}"))
    })?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(AutoclerkError::InvalidClientSecret(format!(
            "{field} must be an http(s) URL, got {value:?}"
        ))
        .into());
    }
    Ok(url)
}

/// Returns `true` when `uri` points at the local machine.
fn is_loopback(uri: &str) -> bool {
    Url::parse(uri)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
}
