//! Autoclerk - Google Docs authorization library
//!
//! This library provides the credential lifecycle behind the Autoclerk
//! assistant: the OAuth2 authorization code flow with PKCE, token refresh,
//! scope checks, and durable token storage.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Authorization flow, token storage, and the authorization manager
//! - `commands`: Handlers behind the CLI subcommands
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use autoclerk::{AuthManager, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let manager = AuthManager::from_config(&config.auth)?;
//!     let credential = manager.get_credential(&config.auth.scope_set()).await?;
//!     println!("{}", credential.authorization_header());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::{AuthManager, AuthState, Credential, ScopeSet, TokenRecord, TokenStorage};
pub use config::Config;
pub use error::{AutoclerkError, Result};
