//! Configuration management for Autoclerk
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::auth::flow::OAuthFlowConfig;
use crate::auth::scopes::{ScopeSet, DOCS_SCOPES};
use crate::error::{AutoclerkError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Autoclerk
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Authorization manager configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Where the token record is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file replaced atomically on each save
    #[default]
    File,
    /// OS native credential store
    Keyring,
}

impl std::str::FromStr for StorageBackend {
    type Err = AutoclerkError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            other => Err(AutoclerkError::Config(format!(
                "Invalid storage backend: {other}. Must be one of: file, keyring"
            ))),
        }
    }
}

/// Authorization configuration
///
/// Controls where credentials live and how the interactive flow behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path to the provider-issued client secret JSON
    #[serde(default = "default_client_secret_path")]
    pub client_secret_path: PathBuf,

    /// Path to the token record file; defaults to the platform data directory
    #[serde(default)]
    pub token_path: Option<PathBuf>,

    /// Token storage backend
    #[serde(default)]
    pub storage: StorageBackend,

    /// Account name used with the keyring backend
    #[serde(default = "default_keyring_account")]
    pub keyring_account: String,

    /// Scopes requested when no scope is given on the command line
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Local port for the redirect listener (0 = any free port)
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,

    /// Path the provider redirects back to
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,

    /// Seconds to wait for the browser callback
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,

    /// Launch the system browser instead of only printing the URL
    #[serde(default)]
    pub open_browser: bool,

    /// Retries for unreachable token endpoint (0 disables retrying)
    #[serde(default)]
    pub network_retries: u32,

    /// Initial retry delay in milliseconds, doubled per retry
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_millis: u64,

    /// Timeout for each HTTP request to the provider
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_client_secret_path() -> PathBuf {
    PathBuf::from("client_secret.json")
}

fn default_keyring_account() -> String {
    "google-docs".to_string()
}

fn default_scopes() -> Vec<String> {
    DOCS_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_redirect_port() -> u16 {
    8080
}

fn default_redirect_path() -> String {
    "/".to_string()
}

fn default_callback_timeout() -> u64 {
    300
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_secret_path: default_client_secret_path(),
            token_path: None,
            storage: StorageBackend::default(),
            keyring_account: default_keyring_account(),
            scopes: default_scopes(),
            redirect_port: default_redirect_port(),
            redirect_path: default_redirect_path(),
            callback_timeout_seconds: default_callback_timeout(),
            open_browser: false,
            network_retries: 0,
            retry_backoff_millis: default_retry_backoff(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

impl AuthConfig {
    /// Configured scopes as a [`ScopeSet`]
    pub fn scope_set(&self) -> ScopeSet {
        self.scopes.iter().map(String::as_str).collect()
    }

    /// Flow parameters derived from this configuration
    pub fn flow_config(&self) -> OAuthFlowConfig {
        OAuthFlowConfig {
            redirect_port: self.redirect_port,
            redirect_path: self.redirect_path.clone(),
            callback_timeout: Duration::from_secs(self.callback_timeout_seconds),
            network_retries: self.network_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_millis),
        }
    }

    /// Token file location, falling back to the platform data directory
    ///
    /// # Errors
    ///
    /// Returns error if no path is configured and no home directory can be
    /// determined
    pub fn resolved_token_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.token_path {
            return Ok(path.clone());
        }
        directories::ProjectDirs::from("", "", "autoclerk")
            .map(|dirs| dirs.data_dir().join("token.json"))
            .ok_or_else(|| {
                AutoclerkError::Config(
                    "Cannot determine a data directory; set auth.token_path".to_string(),
                )
                .into()
            })
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AutoclerkError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AutoclerkError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        let auth = &mut self.auth;

        if let Ok(path) = std::env::var("AUTOCLERK_CLIENT_SECRET") {
            tracing::debug!(path = %path, "Env override: AUTOCLERK_CLIENT_SECRET");
            auth.client_secret_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("AUTOCLERK_TOKEN_PATH") {
            tracing::debug!(path = %path, "Env override: AUTOCLERK_TOKEN_PATH");
            auth.token_path = Some(PathBuf::from(path));
        }

        if let Ok(storage) = std::env::var("AUTOCLERK_STORAGE") {
            match storage.parse() {
                Ok(backend) => auth.storage = backend,
                Err(_) => tracing::warn!("Invalid AUTOCLERK_STORAGE: {}", storage),
            }
        }

        if let Ok(scopes) = std::env::var("AUTOCLERK_SCOPES") {
            auth.scopes = scopes
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            tracing::debug!(scopes = ?auth.scopes, "Env override: AUTOCLERK_SCOPES");
        }

        if let Ok(port) = std::env::var("AUTOCLERK_REDIRECT_PORT") {
            if let Ok(v) = port.parse() {
                auth.redirect_port = v;
            } else {
                tracing::warn!("Invalid AUTOCLERK_REDIRECT_PORT: {}", port);
            }
        }

        if let Ok(timeout) = std::env::var("AUTOCLERK_CALLBACK_TIMEOUT") {
            if let Ok(v) = timeout.parse() {
                auth.callback_timeout_seconds = v;
            } else {
                tracing::warn!("Invalid AUTOCLERK_CALLBACK_TIMEOUT: {}", timeout);
            }
        }

        if let Ok(retries) = std::env::var("AUTOCLERK_NETWORK_RETRIES") {
            if let Ok(v) = retries.parse() {
                auth.network_retries = v;
            } else {
                tracing::warn!("Invalid AUTOCLERK_NETWORK_RETRIES: {}", retries);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.client_secret {
            self.auth.client_secret_path = path.clone();
        }
        if let Some(path) = &cli.token_path {
            self.auth.token_path = Some(path.clone());
        }
        if let Some(timeout) = cli.timeout {
            self.auth.callback_timeout_seconds = timeout;
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let auth = &self.auth;

        if auth.callback_timeout_seconds == 0 {
            return Err(AutoclerkError::Config(
                "auth.callback_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if auth.http_timeout_seconds == 0 {
            return Err(AutoclerkError::Config(
                "auth.http_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if !auth.redirect_path.starts_with('/') {
            return Err(AutoclerkError::Config(format!(
                "auth.redirect_path must start with '/': {}",
                auth.redirect_path
            ))
            .into());
        }

        if auth.network_retries > 10 {
            return Err(AutoclerkError::Config(
                "auth.network_retries must be less than or equal to 10".to_string(),
            )
            .into());
        }

        if auth.storage == StorageBackend::Keyring && auth.keyring_account.trim().is_empty() {
            return Err(AutoclerkError::Config(
                "auth.keyring_account cannot be empty with the keyring backend".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::scopes::DOCUMENTS;
    use crate::cli::{Cli, Commands};
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.redirect_port, 8080);
        assert_eq!(config.auth.redirect_path, "/");
        assert_eq!(config.auth.storage, StorageBackend::File);
        assert_eq!(config.auth.network_retries, 0);
        assert!(config.auth.scope_set().contains(DOCUMENTS));
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.auth.callback_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_relative_redirect_path() {
        let mut config = Config::default();
        config.auth.redirect_path = "callback".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_too_many_retries() {
        let mut config = Config::default();
        config.auth.network_retries = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
auth:
  client_secret_path: /etc/autoclerk/client_secret.json
  token_path: /var/lib/autoclerk/token.json
  storage: keyring
  scopes:
    - https://www.googleapis.com/auth/documents
  redirect_port: 9090
  redirect_path: /oauth2callback
  callback_timeout_seconds: 120
  network_retries: 3
  retry_backoff_millis: 250
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.auth.storage, StorageBackend::Keyring);
        assert_eq!(config.auth.redirect_port, 9090);
        assert_eq!(config.auth.scopes.len(), 1);

        let flow = config.auth.flow_config();
        assert_eq!(flow.callback_timeout, Duration::from_secs(120));
        assert_eq!(flow.network_retries, 3);
        assert_eq!(flow.retry_backoff, Duration::from_millis(250));
        assert_eq!(
            config.auth.resolved_token_path().unwrap(),
            PathBuf::from("/var/lib/autoclerk/token.json")
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("auth:\n  open_browser: true\n").unwrap();
        assert!(config.auth.open_browser);
        assert_eq!(config.auth.callback_timeout_seconds, 300);
        assert_eq!(config.auth.keyring_account, "google-docs");
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("FILE".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!("keyring".parse::<StorageBackend>().unwrap(), StorageBackend::Keyring);
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let cli = Cli {
            config: None,
            verbose: false,
            client_secret: Some(PathBuf::from("/tmp/cs.json")),
            token_path: Some(PathBuf::from("/tmp/tok.json")),
            timeout: Some(42),
            command: Commands::Status,
        };
        let mut config = Config::default();
        config.apply_cli_overrides(&cli);
        assert_eq!(config.auth.client_secret_path, PathBuf::from("/tmp/cs.json"));
        assert_eq!(config.auth.token_path, Some(PathBuf::from("/tmp/tok.json")));
        assert_eq!(config.auth.callback_timeout_seconds, 42);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_falls_back_to_defaults() {
        let cli = Cli::default();
        let config = Config::load("/definitely/not/here.yaml", &cli).expect("defaults");
        assert_eq!(config.auth.redirect_port, 8080);
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_auth_fields() {
        std::env::set_var("AUTOCLERK_SCOPES", "docs, drive");
        std::env::set_var("AUTOCLERK_REDIRECT_PORT", "9191");
        std::env::set_var("AUTOCLERK_STORAGE", "keyring");
        std::env::set_var("AUTOCLERK_CALLBACK_TIMEOUT", "not-a-number");

        let mut cfg = Config::default();
        cfg.apply_env_vars();

        std::env::remove_var("AUTOCLERK_SCOPES");
        std::env::remove_var("AUTOCLERK_REDIRECT_PORT");
        std::env::remove_var("AUTOCLERK_STORAGE");
        std::env::remove_var("AUTOCLERK_CALLBACK_TIMEOUT");

        assert_eq!(cfg.auth.scopes, vec!["docs".to_string(), "drive".to_string()]);
        assert_eq!(cfg.auth.redirect_port, 9191);
        assert_eq!(cfg.auth.storage, StorageBackend::Keyring);
        // invalid values are ignored
        assert_eq!(cfg.auth.callback_timeout_seconds, 300);
    }
}
