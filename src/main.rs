//! Autoclerk - Google Docs authorization CLI
//!
#![doc = "Autoclerk - Google Docs authorization CLI"]
#![doc = "Main entry point for the Autoclerk credential manager."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autoclerk::cli::{Cli, Commands};
use autoclerk::commands;
use autoclerk::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match &cli.command {
        Commands::Login { scopes } => {
            tracing::info!("Starting login");
            commands::login::run_login(&config, scopes).await?;
            Ok(())
        }
        Commands::Token { scopes } => {
            tracing::debug!("Resolving access token");
            commands::token::run_token(&config, scopes).await?;
            Ok(())
        }
        Commands::Status => {
            commands::status::show_status(&config)?;
            Ok(())
        }
        Commands::Revoke => {
            commands::revoke::run_revoke(&config)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so `autoclerk token` output stays clean.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "autoclerk=debug"
    } else {
        "autoclerk=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
