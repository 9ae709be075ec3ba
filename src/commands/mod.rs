/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes four top-level command modules:

- `login` : Ensure a valid credential, authorizing in the browser if needed
- `token` : Print a valid access token
- `status`: Describe the stored credential without network access
- `revoke`: Delete the stored credential

These handlers are intentionally small; the credential lifecycle lives in
[`crate::auth::manager::AuthManager`].
*/

use crate::auth::manager::{open_storage, AuthManager};
use crate::auth::scopes::ScopeSet;
use crate::auth::token_store::{TokenRecord, TokenStorage};
use crate::config::Config;
use crate::error::Result;

/// Scopes named on the command line, or the configured defaults when none
/// were given.
pub fn required_scopes(config: &Config, cli_scopes: &[String]) -> ScopeSet {
    if cli_scopes.is_empty() {
        config.auth.scope_set()
    } else {
        cli_scopes.iter().map(String::as_str).collect()
    }
}

// Login command handler
pub mod login {
    use super::*;
    use colored::Colorize;

    /// Obtain a credential covering the requested scopes
    ///
    /// Returns immediately when the stored record is valid; otherwise
    /// refreshes or runs the interactive flow and persists the result.
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `scopes` - Scopes from `--scope`; empty means the configured scopes
    pub async fn run_login(config: &Config, scopes: &[String]) -> Result<()> {
        let required = required_scopes(config, scopes);
        let manager = AuthManager::from_config(&config.auth)?;

        let credential = manager.get_credential(&required).await?;

        println!("{}", "Authorized.".green().bold());
        println!("Scopes:  {}", credential.scopes);
        match credential.expires_at {
            Some(at) => println!("Expires: {}", at.to_rfc3339()),
            None => println!("Expires: unknown"),
        }
        println!("Stored:  {}", manager.storage_description());
        Ok(())
    }
}

// Token command handler
pub mod token {
    use super::*;

    /// Print a valid access token to stdout
    ///
    /// Diagnostics go to stderr so the output can be captured by scripts.
    pub async fn run_token(config: &Config, scopes: &[String]) -> Result<()> {
        let required = required_scopes(config, scopes);
        let manager = AuthManager::from_config(&config.auth)?;
        let credential = manager.get_credential(&required).await?;
        println!("{}", credential.access_token);
        Ok(())
    }
}

// Status command handler
pub mod status {
    use super::*;
    use chrono::{DateTime, Utc};
    use colored::Colorize;

    /// Show the stored credential without contacting the provider
    ///
    /// Token values are never printed.
    pub fn show_status(config: &Config) -> Result<()> {
        let storage = open_storage(&config.auth)?;
        let record = storage.load()?;
        let report = render_status(
            &storage.describe(),
            record.as_ref(),
            &config.auth.scope_set(),
            Utc::now(),
        );
        print!("{report}");
        Ok(())
    }

    /// Formats the status report for `record` as of `now`.
    pub fn render_status(
        storage: &str,
        record: Option<&TokenRecord>,
        required: &ScopeSet,
        now: DateTime<Utc>,
    ) -> String {
        let mut out = format!("Storage: {storage}\n");

        let Some(record) = record else {
            out.push_str(&format!(
                "State:   {}\n",
                "no credential (run `autoclerk login`)".yellow()
            ));
            return out;
        };

        let state = if !record.is_expired_at(now) {
            "valid".green()
        } else if record.can_refresh() {
            "expired (refreshable)".yellow()
        } else {
            "expired (re-authorization required)".red()
        };
        out.push_str(&format!("State:   {state}\n"));

        match record.expires_at {
            Some(at) => out.push_str(&format!("Expires: {}\n", at.to_rfc3339())),
            None => out.push_str("Expires: unknown\n"),
        }
        out.push_str(&format!(
            "Refresh: {}\n",
            if record.can_refresh() { "present" } else { "absent" }
        ));
        out.push_str(&format!("Scopes:  {}\n", record.scopes));

        let missing: Vec<&str> = record.scopes.missing(required).collect();
        if !missing.is_empty() {
            out.push_str(&format!(
                "Missing: {}\n",
                missing.join(" ").as_str().red()
            ));
        }
        out
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::Duration;

        fn record(expires_in: i64, refresh: bool) -> TokenRecord {
            TokenRecord {
                access_token: "secret-access".to_string(),
                token_type: "Bearer".to_string(),
                refresh_token: refresh.then(|| "secret-refresh".to_string()),
                expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
                scopes: ["docs"].into_iter().collect(),
            }
        }

        #[test]
        fn test_status_without_record() {
            let out = render_status("memory", None, &ScopeSet::new(), Utc::now());
            assert!(out.contains("no credential"));
        }

        #[test]
        fn test_status_never_prints_tokens() {
            let out = render_status(
                "memory",
                Some(&record(3600, true)),
                &["docs"].into_iter().collect(),
                Utc::now(),
            );
            assert!(out.contains("valid"));
            assert!(!out.contains("secret-access"));
            assert!(!out.contains("secret-refresh"));
        }

        #[test]
        fn test_status_reports_expiry_and_missing_scopes() {
            let required: ScopeSet = ["docs", "drive"].into_iter().collect();
            let out = render_status("memory", Some(&record(-10, false)), &required, Utc::now());
            assert!(out.contains("re-authorization required"));
            assert!(out.contains("Refresh: absent"));
            assert!(out.contains("Missing: "));
            assert!(out.contains("drive"));
        }

        #[test]
        fn test_status_refreshable() {
            let out = render_status(
                "memory",
                Some(&record(-10, true)),
                &["docs"].into_iter().collect(),
                Utc::now(),
            );
            assert!(out.contains("expired (refreshable)"));
            assert!(!out.contains("Missing"));
        }
    }
}

// Revoke command handler
pub mod revoke {
    use super::*;
    use colored::Colorize;

    /// Delete the stored credential
    ///
    /// Opens the storage backend directly instead of going through
    /// [`AuthManager::revoke`], so revoking works when the client secret is
    /// missing or broken. Deleting when nothing is stored succeeds. The
    /// provider-side grant is left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the storage backend cannot be opened or the record
    /// cannot be removed
    pub fn run_revoke(config: &Config) -> Result<()> {
        let storage = open_storage(&config.auth)?;
        storage.delete()?;
        tracing::info!(storage = %storage.describe(), "Stored credential revoked");
        println!(
            "{}",
            format!("Removed stored credential from {}", storage.describe()).green()
        );
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::auth::token_store::FileTokenStorage;

        #[test]
        fn test_revoke_works_without_client_secret_and_is_idempotent() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("token.json");
            FileTokenStorage::new(&path)
                .atomic_save(&TokenRecord {
                    access_token: "A1".to_string(),
                    token_type: "Bearer".to_string(),
                    refresh_token: None,
                    expires_at: None,
                    scopes: ScopeSet::new(),
                })
                .unwrap();

            let mut config = Config::default();
            config.auth.token_path = Some(path.clone());
            config.auth.client_secret_path = dir.path().join("missing_client_secret.json");

            run_revoke(&config).unwrap();
            assert!(!path.exists());
            run_revoke(&config).unwrap();
        }
    }
}
