//! CLI argument routing tests.

use clap::Parser;
use freesail_cli::{Cli, Commands};

#[test]
fn test_cli_routes_gateway_status() {
    let cli = Cli::try_parse_from(["freesail", "gateway", "status"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Gateway(args)
            if matches!(args.command, freesail_cli::commands::gateway::GatewayCommand::Status)
    ));
}

#[test]
fn test_cli_rejects_unknown_command() {
    assert!(Cli::try_parse_from(["freesail", "agent", "chat"]).is_err());
}

#[tokio::test]
async fn test_cli_config_path_uses_explicit_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("custom.json5");
    let cli = Cli::try_parse_from(["freesail", "--config", path.to_str().unwrap(), "config", "init"])
        .unwrap();
    freesail_cli::run(cli).await.unwrap();
    assert!(path.exists());
}
