//! Freesail CLI entry point.

use clap::Parser;
use freesail_cli::{init_logging, run, Cli};
use freesail_core::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config errors are reported by the command itself
    let logging = Config::load_from(cli.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(cli.verbose, &logging);

    run(cli).await
}
