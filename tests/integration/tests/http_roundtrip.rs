//! A resilient client and an agent talking through a live gateway.

use freesail_client::{HttpConnector, ResilientTransport, SendOutcome, TransportEvent};
use freesail_core::config::TransportConfig;
use freesail_core::protocol::codec::DEFAULT_MAX_BUFFER_BYTES;
use freesail_core::protocol::{DownstreamMessage, UpstreamMessage, UserAction};
use freesail_gateway::Gateway;
use freesail_integration_tests::{rpc, serve, test_config};
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn next_message(events: &mut broadcast::Receiver<TransportEvent>) -> DownstreamMessage {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("event channel closed");
        if let TransportEvent::Message(message) = event {
            return message;
        }
    }
}

async fn wait_for_session(transport: &ResilientTransport) -> String {
    for _ in 0..100 {
        if let Some(session_id) = transport.session_id() {
            return session_id;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no session id announced");
}

#[tokio::test]
async fn test_client_and_agent_roundtrip() {
    let mut config = test_config();
    // closed client streams are noticed on the next keep-alive write
    config.session.keepalive_secs = 1;
    let gateway = Gateway::new(config).await;
    let addr = serve(&gateway).await;

    let connector = HttpConnector::new(&format!("http://{}", addr)).unwrap();
    let transport = ResilientTransport::new(
        Arc::new(connector),
        TransportConfig {
            ping_interval_ms: 0,
            catalogs: vec!["cat1".to_string()],
            ..TransportConfig::default()
        },
        DEFAULT_MAX_BUFFER_BYTES,
    );
    let mut events = transport.subscribe();
    transport.connect().await;
    let session_id = wait_for_session(&transport).await;

    let listed = rpc(addr, "sessions.list", json!({})).await;
    assert_eq!(listed["total"], json!(1));
    assert_eq!(listed["sessions"][0]["sessionId"], json!(session_id));

    let created = rpc(
        addr,
        "surface.create",
        json!({"sessionId": session_id, "surfaceId": "main", "catalogId": "cat1", "sendDataModel": true}),
    )
    .await;
    assert_eq!(created["success"], json!(true));
    match next_message(&mut events).await {
        DownstreamMessage::CreateSurface(create) => assert_eq!(create.catalog_id, "cat1"),
        other => panic!("unexpected {:?}", other),
    }

    rpc(
        addr,
        "surface.updateDataModel",
        json!({"surfaceId": "main", "path": "/count", "value": 3}),
    )
    .await;
    match next_message(&mut events).await {
        DownstreamMessage::UpdateDataModel(update) => {
            assert_eq!(update.path.as_deref(), Some("/count"));
            assert_eq!(update.value, Some(json!(3)));
        }
        other => panic!("unexpected {:?}", other),
    }

    let mut context = Map::new();
    context.insert("delta".to_string(), json!(1));
    let outcome = transport
        .send(UpstreamMessage::Action(UserAction {
            name: "increment".to_string(),
            surface_id: "main".to_string(),
            source_component_id: "plus".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            context,
        }))
        .await;
    assert_eq!(outcome, SendOutcome::Delivered);

    let drained = rpc(addr, "actions.drain", json!({"agentId": "agent-1"})).await;
    let batch = &drained["batches"][0];
    assert_eq!(batch["sessionId"], json!(session_id));
    let names: Vec<&str> = batch["actions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["action"]["name"].as_str())
        .collect();
    assert_eq!(names, vec!["__session_connected", "increment"]);
    assert_eq!(batch["dataModels"]["main"], json!({"count": 3}));

    transport.disconnect();
    for _ in 0..500 {
        if gateway.state().counts().await.0 == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session not removed after client disconnect");
}

#[tokio::test]
async fn test_health_endpoint() {
    let gateway = Gateway::new(test_config()).await;
    let addr = serve(&gateway).await;

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], json!("ok"));
    assert_eq!(health["sessions"], json!(0));
}
