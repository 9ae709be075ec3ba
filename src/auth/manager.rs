//! Authorization manager
//!
//! [`AuthManager`] is the sole entry point callers use to obtain a
//! credential for the document API. It owns the token storage handed to it
//! at construction and an [`OAuthFlow`] for provider exchanges.
//!
//! # Resolution order of [`AuthManager::get_credential`]
//!
//! 1. Stored record that is unexpired and covers the required scopes:
//!    returned as-is, no provider I/O.
//! 2. Stored record that covers the scopes but is expired, with a refresh
//!    token: one refresh exchange, persisted on success.
//! 3. Anything else (no record, refresh rejected, insufficient scope): the
//!    interactive authorization code flow, persisted on success.
//!
//! # Concurrency
//!
//! Only one authorization or refresh runs at a time. A call that arrives
//! while the manager is [`AuthState::Authorizing`] or
//! [`AuthState::Refreshing`] fails immediately with
//! [`AutoclerkError::AuthorizationInProgress`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::auth::client_secret::ClientSecret;
use crate::auth::flow::{ConsolePrompt, OAuthFlow, OAuthFlowConfig};
use crate::auth::scopes::ScopeSet;
use crate::auth::token_store::{
    Credential, FileTokenStorage, KeyringTokenStorage, TokenRecord, TokenStorage,
};
use crate::config::{AuthConfig, StorageBackend};
use crate::error::{AutoclerkError, Result};

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

/// Lifecycle state of the managed credential.
///
/// ```text
/// NoCredential -> Authorizing -> Authorized -> (expiry) -> Refreshing -> Authorized
/// Authorizing  -> NoCredential   (CSRF mismatch, denial, timeout, failure)
/// any          -> NoCredential   (revoke)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    Authorizing,
    Authorized,
    Refreshing,
}

impl AuthState {
    fn is_busy(self) -> bool {
        matches!(self, AuthState::Authorizing | AuthState::Refreshing)
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthState::NoCredential => "no credential",
            AuthState::Authorizing => "authorizing",
            AuthState::Authorized => "authorized",
            AuthState::Refreshing => "refreshing",
        };
        f.write_str(s)
    }
}

/// Marks the manager busy for the lifetime of one authorization or refresh.
/// Dropping it without [`Transition::complete`] lands in `NoCredential`.
struct Transition<'a> {
    state: &'a Mutex<AuthState>,
    completed: bool,
}

impl Transition<'_> {
    fn complete(mut self) {
        self.completed = true;
        *lock(self.state) = AuthState::Authorized;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *lock(self.state) = AuthState::NoCredential;
        }
    }
}

fn lock(state: &Mutex<AuthState>) -> MutexGuard<'_, AuthState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// AuthManager
// ---------------------------------------------------------------------------

/// Supplies valid credentials, refreshing or re-authorizing as needed.
pub struct AuthManager {
    storage: Arc<dyn TokenStorage>,
    flow: OAuthFlow,
    state: Mutex<AuthState>,
}

impl AuthManager {
    /// Creates a manager over an explicit storage backend and flow.
    ///
    /// The manager starts in [`AuthState::NoCredential`]; the stored record
    /// is first read by [`get_credential`](Self::get_credential).
    ///
    /// # Arguments
    ///
    /// * `flow` - Authorization and refresh exchanges for the client
    /// * `storage` - Backend holding the single token record
    pub fn new(flow: OAuthFlow, storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            storage,
            flow,
            state: Mutex::new(AuthState::NoCredential),
        }
    }

    /// Builds a manager from configuration: loads the client secret, picks
    /// the storage backend, and prompts on the console.
    ///
    /// # Errors
    ///
    /// Returns [`AutoclerkError::InvalidClientSecret`] if the client secret
    /// file cannot be used.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let client = ClientSecret::load(&config.client_secret_path)?;
        let storage = open_storage(config)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .map_err(|e| AutoclerkError::Config(format!("failed to build HTTP client: {e}")))?;

        let flow = OAuthFlow::new(
            Arc::new(http),
            Arc::new(client),
            config.flow_config(),
            Arc::new(ConsolePrompt {
                open_browser: config.open_browser,
            }),
        );

        tracing::debug!(storage = %storage.describe(), "Authorization manager ready");
        Ok(Self::new(flow, storage))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AuthState {
        *lock(&self.state)
    }

    /// Reads the stored record without contacting the provider.
    pub fn stored_record(&self) -> Result<Option<TokenRecord>> {
        self.storage.load()
    }

    /// Human-readable description of the storage backend.
    pub fn storage_description(&self) -> String {
        self.storage.describe()
    }

    /// Returns a credential whose scopes cover `required`.
    ///
    /// # Errors
    ///
    /// - [`AutoclerkError::AuthorizationInProgress`] if another call is
    ///   authorizing or refreshing.
    /// - [`AutoclerkError::CsrfMismatch`], [`AutoclerkError::AuthorizationTimeout`],
    ///   [`AutoclerkError::AuthorizationDenied`] from the interactive flow.
    /// - [`AutoclerkError::InvalidClientSecret`], [`AutoclerkError::ApiNotEnabled`],
    ///   [`AutoclerkError::Network`] from the token endpoint.
    ///
    /// No record is written unless the whole exchange succeeds.
    pub async fn get_credential(&self, required: &ScopeSet) -> Result<Credential> {
        if self.state().is_busy() {
            return Err(AutoclerkError::AuthorizationInProgress.into());
        }

        let existing = self.storage.load()?;

        if let Some(record) = existing.as_ref() {
            if !record.covers(required) {
                tracing::info!(
                    missing = %record.scopes.missing(required).collect::<Vec<_>>().join(" "),
                    "Stored credential lacks required scopes; re-authorization required"
                );
            } else if !record.is_expired() {
                self.mark_authorized();
                return Ok(record.credential());
            } else if record.can_refresh() {
                match self.refresh(record).await {
                    Ok(refreshed) if refreshed.covers(required) => {
                        return Ok(refreshed.credential());
                    }
                    Ok(refreshed) => {
                        tracing::info!(
                            missing = %refreshed.scopes.missing(required).collect::<Vec<_>>().join(" "),
                            "Refreshed credential lacks required scopes; re-authorization required"
                        );
                        return self.authorize(required, Some(&refreshed)).await;
                    }
                    Err(e) if falls_through_to_authorization(&e) => {
                        tracing::warn!("Token refresh rejected: {}. Running full authorization", e);
                    }
                    Err(e) => return Err(e),
                }
            } else {
                tracing::info!("Stored credential expired and has no refresh token");
            }
        }

        self.authorize(required, existing.as_ref()).await
    }

    /// Deletes the stored record, forcing full re-authorization next time.
    pub fn revoke(&self) -> Result<()> {
        self.storage.delete()?;
        *lock(&self.state) = AuthState::NoCredential;
        tracing::info!(storage = %self.storage.describe(), "Stored credential revoked");
        Ok(())
    }

    /// Inserts an `Authorization` header for `credential` into `headers`.
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use autoclerk::auth::manager::AuthManager;
    /// use autoclerk::auth::token_store::Credential;
    ///
    /// let cred = Credential {
    ///     access_token: "tok".to_string(),
    ///     token_type: "Bearer".to_string(),
    ///     expires_at: None,
    ///     scopes: Default::default(),
    /// };
    /// let mut headers = HashMap::new();
    /// AuthManager::inject_token(&mut headers, &cred);
    /// assert_eq!(headers["Authorization"], "Bearer tok");
    /// ```
    pub fn inject_token(headers: &mut HashMap<String, String>, credential: &Credential) {
        headers.insert(
            "Authorization".to_string(),
            credential.authorization_header(),
        );
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Refreshes and persists `record`. The provider may narrow the grant on
    /// refresh, so the caller re-checks coverage on the returned record.
    async fn refresh(&self, record: &TokenRecord) -> Result<TokenRecord> {
        let transition = self.begin(AuthState::Refreshing)?;
        tracing::info!("Access token expired; refreshing");

        let refreshed = self.flow.refresh(record).await?;
        self.storage.atomic_save(&refreshed)?;

        transition.complete();
        tracing::info!(expires_at = ?refreshed.expires_at, "Access token refreshed");
        Ok(refreshed)
    }

    async fn authorize(
        &self,
        required: &ScopeSet,
        existing: Option<&TokenRecord>,
    ) -> Result<Credential> {
        let transition = self.begin(AuthState::Authorizing)?;

        // Keep what was already granted so a step-up does not drop scopes.
        let requested = match existing {
            Some(record) => required.union(&record.scopes),
            None => required.clone(),
        };
        tracing::info!(scopes = %requested, "Starting interactive authorization");

        let mut record = self.flow.authorize(&requested).await?;

        if !record.covers(required) {
            return Err(AutoclerkError::AuthorizationDenied(format!(
                "provider granted only [{}]; missing [{}]",
                record.scopes,
                record.scopes.missing(required).collect::<Vec<_>>().join(" ")
            ))
            .into());
        }

        if record.refresh_token.is_none() {
            record.refresh_token = existing.and_then(|r| r.refresh_token.clone());
        }

        self.storage.atomic_save(&record)?;
        transition.complete();
        tracing::info!(scopes = %record.scopes, "Authorization complete");
        Ok(record.credential())
    }

    fn begin(&self, target: AuthState) -> Result<Transition<'_>> {
        let mut state = lock(&self.state);
        if state.is_busy() {
            return Err(AutoclerkError::AuthorizationInProgress.into());
        }
        *state = target;
        Ok(Transition {
            state: &self.state,
            completed: false,
        })
    }

    fn mark_authorized(&self) {
        let mut state = lock(&self.state);
        if !state.is_busy() {
            *state = AuthState::Authorized;
        }
    }
}

/// Opens the storage backend selected by `config`.
///
/// Does not touch the client secret, so it works for commands that only
/// inspect or delete the stored record.
pub fn open_storage(config: &AuthConfig) -> Result<Arc<dyn TokenStorage>> {
    Ok(match config.storage {
        StorageBackend::File => Arc::new(FileTokenStorage::new(config.resolved_token_path()?)),
        StorageBackend::Keyring => Arc::new(KeyringTokenStorage::new(&config.keyring_account)),
    })
}

/// Refresh failures that a fresh authorization can fix. Bad client
/// descriptors, disabled APIs and network trouble would fail the
/// interactive flow the same way, so they surface directly.
fn falls_through_to_authorization(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<AutoclerkError>(),
        Some(AutoclerkError::TokenExchange(_))
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
