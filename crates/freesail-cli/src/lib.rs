//! Freesail command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use freesail_core::config::LoggingConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose log output the default filter enables.
const LOG_TARGETS: &[&str] = &["freesail", "freesail_cli", "freesail_core", "freesail_gateway", "freesail_client"];

/// Freesail - agent-driven UI gateway
#[derive(Parser)]
#[command(name = "freesail")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "FREESAIL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run or query the gateway server
    Gateway(commands::gateway::GatewayArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Gateway(args) => commands::gateway::run(args, config_path).await,
        Commands::Config(args) => commands::config::run(args, config_path).await,
        Commands::Version => {
            println!("freesail {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `-v`/`-vv` raise the configured level
/// to debug/trace.
pub fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose, logging)));

    let json = logging.json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();
}

fn default_directives(verbose: u8, logging: &LoggingConfig) -> String {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}
