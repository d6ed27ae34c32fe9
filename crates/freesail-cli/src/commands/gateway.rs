//! Gateway command.

use clap::Args;
use freesail_core::config::{BindMode, Config};
use freesail_gateway::Gateway;
use std::path::{Path, PathBuf};
use tracing::info;

/// Gateway command arguments.
#[derive(Args)]
pub struct GatewayArgs {
    #[command(subcommand)]
    pub command: GatewayCommand,
}

#[derive(clap::Subcommand)]
pub enum GatewayCommand {
    /// Start the gateway server
    Run {
        /// Bind mode (loopback, lan)
        #[arg(short, long, env = "FREESAIL_BIND")]
        bind: Option<String>,

        /// Port number
        #[arg(short, long, env = "FREESAIL_PORT")]
        port: Option<u16>,

        /// Directory of catalog files to preload
        #[arg(long, env = "FREESAIL_CATALOGS")]
        catalogs: Option<PathBuf>,
    },

    /// Show the status of a running gateway
    Status,
}

/// Run the gateway command.
pub async fn run(args: GatewayArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = Config::load_from(config_path)?;

    match args.command {
        GatewayCommand::Run {
            bind,
            port,
            catalogs,
        } => {
            if let Some(bind) = bind {
                config.gateway.bind = parse_bind(&bind)?;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if catalogs.is_some() {
                config.gateway.catalogs_dir = catalogs;
            }
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

            let gateway = Gateway::new(config).await;
            info!(
                "Serving {} RPC methods",
                gateway.methods().list().await.len()
            );
            gateway.run(shutdown_signal()).await?;
        }

        GatewayCommand::Status => {
            let url = format!("{}/health", config.transport.base_url.trim_end_matches('/'));
            let health: serde_json::Value = reqwest::get(&url)
                .await
                .map_err(|e| anyhow::anyhow!("Gateway not reachable at {}: {}", url, e))?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }

    Ok(())
}

fn parse_bind(bind: &str) -> anyhow::Result<BindMode> {
    match bind {
        "loopback" => Ok(BindMode::Loopback),
        "lan" => Ok(BindMode::Lan),
        other => anyhow::bail!("Invalid bind mode: {} (expected loopback or lan)", other),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
