//! Config save/load roundtrip integration tests.

use freesail_client::Backoff;
use freesail_core::config::{BindMode, Config};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("freesail.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, config.gateway.port);
    assert_eq!(loaded.gateway.bind, config.gateway.bind);
    assert_eq!(loaded.transport.max_queue, config.transport.max_queue);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_handwritten_json5_drives_client_backoff() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("freesail.json5");
    std::fs::write(
        &path,
        r#"{
            // reachable from the LAN, reconnect quickly
            gateway: { bind: "lan" },
            transport: { initial_delay_ms: 250, max_delay_ms: 1000, backoff_factor: 3 },
        }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.gateway.bind, BindMode::Lan);

    let mut backoff = Backoff::from_config(&config.transport);
    assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    assert_eq!(backoff.next_delay(), Duration::from_millis(750));
    assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/freesail.json5"));
    assert!(result.is_err());
}
