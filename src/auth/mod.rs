//! OAuth2 authorization for the document API
//!
//! This module contains everything needed to obtain, refresh, and persist
//! the credential Autoclerk uses to talk to Google Docs:
//!
//! - [`client_secret`]: loading the provider-issued client descriptor
//! - [`pkce`]: PKCE verifier/challenge and CSRF state generation
//! - [`scopes`]: scope sets and the coverage check
//! - [`provider`]: mapping provider error bodies onto error variants
//! - [`flow`]: the authorization code flow with a loopback redirect
//! - [`token_store`]: token records and their storage backends
//! - [`manager`]: [`AuthManager`], the single entry point for callers

pub mod client_secret;
pub mod flow;
pub mod manager;
pub mod pkce;
pub mod provider;
pub mod scopes;
pub mod token_store;

pub use client_secret::ClientSecret;
pub use flow::{AuthorizationPrompt, ConsolePrompt, OAuthFlow, OAuthFlowConfig};
pub use manager::{AuthManager, AuthState};
pub use scopes::ScopeSet;
pub use token_store::{
    Credential, FileTokenStorage, KeyringTokenStorage, MemoryTokenStorage, TokenRecord,
    TokenStorage,
};
