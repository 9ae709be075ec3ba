//! Token records and their storage backends
//!
//! A [`TokenRecord`] is the persisted outcome of a successful authorization:
//! access token, optional refresh token, expiry and granted scopes. The
//! [`AuthManager`](super::manager::AuthManager) never touches the filesystem
//! directly; it is handed a [`TokenStorage`] at construction and only calls
//! `load`, `atomic_save` and `delete` on it.
//!
//! Three backends are provided:
//!
//! - [`FileTokenStorage`]    -- JSON file, replaced atomically on every save
//! - [`KeyringTokenStorage`] -- OS credential store via `keyring`
//! - [`MemoryTokenStorage`]  -- process-local, used by tests and dry runs

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::scopes::ScopeSet;
use crate::error::{AutoclerkError, Result};

/// Tokens expiring within this window are treated as already expired so the
/// refresh happens before the resource server starts rejecting them.
pub const EXPIRY_SKEW_SECONDS: i64 = 60;

fn default_token_type() -> String {
    "Bearer".to_string()
}

// ---------------------------------------------------------------------------
// TokenRecord
// ---------------------------------------------------------------------------

/// The persisted credential for the document API.
///
/// The field aliases accept the `token` / `expiry` names written by Google's
/// Python client library, so an existing `token.json` keeps working.
///
/// # Examples
///
/// ```
/// use autoclerk::auth::token_store::TokenRecord;
/// use chrono::{Duration, Utc};
///
/// let record = TokenRecord {
///     access_token: "A1".to_string(),
///     token_type: "Bearer".to_string(),
///     refresh_token: Some("R1".to_string()),
///     expires_at: Some(Utc::now() + Duration::hours(1)),
///     scopes: ["docs"].into_iter().collect(),
/// };
/// assert!(!record.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(alias = "token")]
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry of `access_token`. `None` means the provider did not
    /// report a lifetime and the token is treated as non-expiring.
    #[serde(default, alias = "expiry", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub scopes: ScopeSet,
}

impl TokenRecord {
    /// Returns `true` when the access token is expired or inside the
    /// [`EXPIRY_SKEW_SECONDS`] window.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => now >= expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS),
        }
    }

    /// Returns `true` if the granted scopes include every scope in
    /// `required`.
    pub fn covers(&self, required: &ScopeSet) -> bool {
        self.scopes.covers(required)
    }

    /// Returns `true` if a refresh exchange can be attempted.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Builds the caller-facing [`Credential`] view of this record.
    pub fn credential(&self) -> Credential {
        Credential {
            access_token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
            scopes: self.scopes.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A usable access credential handed out by
/// [`AuthManager::get_credential`](super::manager::AuthManager::get_credential).
///
/// Unlike [`TokenRecord`] it never carries the refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,

    /// Usually `"Bearer"`; used as the `Authorization` header scheme.
    pub token_type: String,

    pub expires_at: Option<DateTime<Utc>>,

    /// Scopes granted to `access_token`.
    pub scopes: ScopeSet,
}

impl Credential {
    /// Value for the HTTP `Authorization` header.
    ///
    /// ```
    /// use autoclerk::auth::token_store::Credential;
    ///
    /// let cred = Credential {
    ///     access_token: "abc".to_string(),
    ///     token_type: "Bearer".to_string(),
    ///     expires_at: None,
    ///     scopes: Default::default(),
    /// };
    /// assert_eq!(cred.authorization_header(), "Bearer abc");
    /// ```
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Keeps access tokens out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TokenStorage
// ---------------------------------------------------------------------------

/// Durable home of the single [`TokenRecord`].
///
/// Implementations must make `atomic_save` all-or-nothing: a reader never
/// observes a partially written record.
pub trait TokenStorage: Send + Sync {
    /// Returns the stored record, or `Ok(None)` when nothing is stored.
    fn load(&self) -> Result<Option<TokenRecord>>;

    /// Replaces the stored record.
    fn atomic_save(&self, record: &TokenRecord) -> Result<()>;

    /// Removes the stored record. Deleting a missing record is not an error.
    fn delete(&self) -> Result<()>;

    /// Human-readable location for status output and logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// FileTokenStorage
// ---------------------------------------------------------------------------

/// Stores the record as pretty-printed JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    /// Creates a backend for `path`. Nothing is touched on disk until the
    /// first load or save; missing parent directories are created on save.
    ///
    /// # Examples
    ///
    /// ```
    /// use autoclerk::auth::token_store::{FileTokenStorage, TokenStorage};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = FileTokenStorage::new(dir.path().join("token.json"));
    /// assert!(storage.load().unwrap().is_none());
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Option<TokenRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AutoclerkError::Io(e).into()),
        };

        let record = parse_record(&contents, &self.describe())?;
        tracing::debug!(path = %self.path.display(), "Loaded token record");
        Ok(Some(record))
    }

    fn atomic_save(&self, record: &TokenRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)?;
        atomic_write(&self.path, &data)?;
        tracing::debug!(path = %self.path.display(), "Saved token record");
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AutoclerkError::Io(e).into()),
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Parses a stored record, reporting corruption as a storage error that
/// names `location` so the operator knows what to delete.
fn parse_record(contents: &str, location: &str) -> Result<TokenRecord> {
    serde_json::from_str(contents).map_err(|e| {
        AutoclerkError::Storage(format!(
            "token record in {location} is corrupt ({e}); delete it to re-authorize"
        ))
        .into()
    })
}

/// Writes `data` to a sibling temp file, syncs it, then renames it over
/// `path`. The temp file is removed on any failure.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AutoclerkError::Storage(format!("token path {} has no file name", path.display()))
    })?;
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{:016x}",
        file_name.to_string_lossy(),
        std::process::id(),
        rand::random::<u64>()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        options.mode(0o600);
    }

    let write_result = (|| -> std::io::Result<()> {
        let mut file = options.open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(AutoclerkError::Io(e).into());
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(AutoclerkError::Io(e).into());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// KeyringTokenStorage
// ---------------------------------------------------------------------------

/// Stores the record as JSON in the OS native credential store (Keychain,
/// Secret Service, Windows Credential Manager).
///
/// A single keyring write replaces the whole secret, so saves are atomic.
#[derive(Debug, Clone)]
pub struct KeyringTokenStorage {
    service: String,
    account: String,
}

impl KeyringTokenStorage {
    /// Creates a backend for `account` under the `autoclerk` keyring service.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            service: "autoclerk".to_string(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| AutoclerkError::Keyring(e).into())
    }
}

impl TokenStorage for KeyringTokenStorage {
    fn load(&self) -> Result<Option<TokenRecord>> {
        match self.entry()?.get_password() {
            Ok(json_str) => Ok(Some(parse_record(&json_str, &self.describe())?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AutoclerkError::Keyring(e).into()),
        }
    }

    fn atomic_save(&self, record: &TokenRecord) -> Result<()> {
        let json_str = serde_json::to_string(record)?;
        self.entry()?
            .set_password(&json_str)
            .map_err(AutoclerkError::Keyring)?;
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AutoclerkError::Keyring(e).into()),
        }
    }

    fn describe(&self) -> String {
        format!("keyring {}/{}", self.service, self.account)
    }
}

// ---------------------------------------------------------------------------
// MemoryTokenStorage
// ---------------------------------------------------------------------------

/// Keeps the record in memory; counts saves so tests can assert on
/// persistence side effects.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    record: Mutex<Option<TokenRecord>>,
    saves: AtomicUsize,
}

impl MemoryTokenStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `record`. The seeded record does
    /// not count towards [`saves`](Self::saves).
    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `atomic_save` calls.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<TokenRecord>>> {
        self.record
            .lock()
            .map_err(|_| AutoclerkError::Storage("memory token storage poisoned".to_string()).into())
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<TokenRecord>> {
        Ok(self.slot()?.clone())
    }

    fn atomic_save(&self, record: &TokenRecord) -> Result<()> {
        *self.slot()? = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.slot()? = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
