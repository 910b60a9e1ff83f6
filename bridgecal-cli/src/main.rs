mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use bridgecal_core::error::{exit, BridgeCalError};

#[derive(Parser)]
#[command(name = "bridgecal")]
#[command(about = "Keep one Outlook and one Google calendar mutually mirrored")]
struct Cli {
    /// Path to config.toml (defaults to ~/.config/bridgecal/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation tick
    Sync,
    /// Reconcile on a fixed interval until interrupted
    Watch {
        /// Tick period (e.g. "5m", "90s"); defaults to interval_seconds
        #[arg(long)]
        interval: Option<String>,
    },
    /// Show mapping store diagnostics
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync => commands::sync::run(cli.config.as_deref()).await,
        Commands::Watch { interval } => {
            commands::watch::run(cli.config.as_deref(), interval.as_deref()).await
        }
        Commands::Status => commands::status::run(cli.config.as_deref()).await,
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            tracing::error!("{err:#}");
            let code = err
                .downcast_ref::<BridgeCalError>()
                .map(BridgeCalError::exit_code)
                .unwrap_or(exit::RUNTIME);
            ExitCode::from(code as u8)
        }
    }
}
