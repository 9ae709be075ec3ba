//! Command-line interface definition for Autoclerk
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to authorize, inspect, and revoke the stored
//! document API credential.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Autoclerk - Google Docs authorization manager
///
/// Obtains, refreshes, and persists the OAuth2 credential the Autoclerk
/// assistant uses to reach the document API.
#[derive(Parser, Debug, Clone)]
#[command(name = "autoclerk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the client secret JSON path
    #[arg(long)]
    pub client_secret: Option<PathBuf>,

    /// Override the token record path
    #[arg(long)]
    pub token_path: Option<PathBuf>,

    /// Seconds to wait for the browser callback
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Autoclerk
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Ensure a valid credential exists, authorizing in the browser if needed
    Login {
        /// Scope to require (repeatable); defaults to the configured scopes
        #[arg(short, long = "scope")]
        scopes: Vec<String>,
    },

    /// Print a valid access token to stdout
    Token {
        /// Scope to require (repeatable); defaults to the configured scopes
        #[arg(short, long = "scope")]
        scopes: Vec<String>,
    },

    /// Show the stored credential without contacting the provider
    Status,

    /// Delete the stored credential
    Revoke,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            client_secret: None,
            token_path: None,
            timeout: None,
            command: Commands::Status,
        }
    }
}
