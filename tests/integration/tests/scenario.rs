//! The end-to-end agent scenario against in-process gateway state.

use freesail_core::catalog::Catalog;
use freesail_core::component::{Component, DynamicValue};
use freesail_core::protocol::{ErrorCode, UpstreamMessage, SESSION_CONNECTED, SESSION_DISCONNECTED};
use freesail_gateway::{GatewayState, HandlerContext, MethodRegistry};
use freesail_integration_tests::{connect, frames, test_config};
use serde_json::json;
use std::sync::Arc;

fn text_catalog() -> Catalog {
    Catalog::new("cat1").with_component(
        "Text",
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }),
    )
}

#[tokio::test]
async fn test_agent_builds_surface_for_session() {
    let state = GatewayState::new(test_config());
    let (s1, mut rx) = connect(&state).await;

    let connected = state.drain_session(&s1).await.unwrap();
    assert_eq!(connected.len(), 1);
    match &connected[0] {
        UpstreamMessage::Action(action) => {
            assert_eq!(action.name, SESSION_CONNECTED);
            assert_eq!(action.context["sessionId"], json!(s1));
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(state
        .create_surface(&s1, "main", "cat1", false, None)
        .await
        .unwrap());
    state
        .update_components(
            &s1,
            "main",
            vec![Component::new("root", "Text").with_property("text", DynamicValue::literal("Hello"))],
        )
        .await
        .unwrap();
    state
        .update_data_model(&s1, "main", Some("/title".to_string()), Some(json!("Hi")))
        .await
        .unwrap();

    let surface = state.get_surface("main").await.unwrap();
    assert_eq!(surface.data_model, json!({"title": "Hi"}));
    assert_eq!(surface.components.len(), 1);
    assert!(surface.components.contains_key("root"));
    assert_eq!(surface.root_id.as_deref(), Some("root"));

    let pushed = frames(&mut rx);
    assert_eq!(pushed[0]["connected"], json!(true));
    assert!(pushed[1].get("createSurface").is_some());
    assert!(pushed[2].get("updateComponents").is_some());
    assert_eq!(pushed[3]["updateDataModel"]["path"], json!("/title"));
}

#[tokio::test]
async fn test_catalog_scope_and_validation() {
    let state = GatewayState::new(test_config());
    let (s1, _rx) = connect(&state).await;
    state.register_catalogs(&s1, vec![text_catalog()]).await.unwrap();

    let denied = state
        .create_surface(&s1, "main", "other", false, None)
        .await
        .unwrap_err();
    assert_eq!(denied.code, ErrorCode::CatalogNotAllowed);

    state
        .create_surface(&s1, "main", "cat1", false, None)
        .await
        .unwrap();
    let invalid = state
        .update_components(&s1, "main", vec![Component::new("root", "Text")])
        .await
        .unwrap_err();
    assert_eq!(invalid.code, ErrorCode::ValidationFailed);
    assert!(invalid.errors.iter().any(|e| e.contains("text")));
}

#[tokio::test]
async fn test_disconnect_notifies_other_sessions() {
    let state = GatewayState::new(test_config());
    let (s1, _rx1) = connect(&state).await;
    let (s2, _rx2) = connect(&state).await;
    state.drain_session(&s2).await.unwrap();

    assert!(state.disconnect_session(&s1).await);
    let notices = state.drain_session(&s2).await.unwrap();
    assert!(notices.iter().any(|m| matches!(
        m,
        UpstreamMessage::Action(a) if a.name == SESSION_DISCONNECTED && a.context["sessionId"] == json!(s1)
    )));
    assert!(state.drain_session(&s1).await.is_err());
}

#[tokio::test]
async fn test_claims_gate_agent_drains() {
    let state = Arc::new(GatewayState::new(test_config()));
    let methods = MethodRegistry::new();
    freesail_gateway::handlers::register_all(&methods, HandlerContext::new(state.clone())).await;

    let (s1, _rx) = connect(&state).await;

    let claimed = methods
        .call("sessions.claim", Some(json!({"agentId": "a", "sessionId": s1})))
        .await
        .unwrap();
    assert_eq!(claimed["success"], json!(true));

    let conflict = methods
        .call("sessions.claim", Some(json!({"agentId": "b", "sessionId": s1})))
        .await
        .unwrap();
    assert_eq!(conflict["success"], json!(false));

    let foreign = methods
        .call("actions.drain", Some(json!({"agentId": "b"})))
        .await
        .unwrap();
    assert_eq!(foreign["count"], json!(0));

    methods
        .call("sessions.release", Some(json!({"agentId": "a", "sessionId": s1})))
        .await
        .unwrap();
    let now_b = methods
        .call("sessions.claim", Some(json!({"agentId": "b", "sessionId": s1})))
        .await
        .unwrap();
    assert_eq!(now_b["success"], json!(true));

    let drained = methods
        .call("actions.drain", Some(json!({"agentId": "b"})))
        .await
        .unwrap();
    assert_eq!(drained["count"], json!(1));
}

#[tokio::test]
async fn test_agents_cannot_touch_another_sessions_surface() {
    let state = Arc::new(GatewayState::new(test_config()));
    let methods = MethodRegistry::new();
    freesail_gateway::handlers::register_all(&methods, HandlerContext::new(state.clone())).await;

    let (owner, mut owner_rx) = connect(&state).await;
    let (other, mut other_rx) = connect(&state).await;

    let created = methods
        .call(
            "surface.create",
            Some(json!({"sessionId": owner, "surfaceId": "main", "catalogId": "cat1"})),
        )
        .await
        .unwrap();
    assert_eq!(created["success"], json!(true));

    let hijack = methods
        .call(
            "surface.create",
            Some(json!({"sessionId": other, "surfaceId": "main", "catalogId": "cat1"})),
        )
        .await
        .unwrap();
    assert_eq!(hijack["error"]["code"], json!("SURFACE_NOT_OWNED"));

    let patched = methods
        .call(
            "surface.updateDataModel",
            Some(json!({"sessionId": other, "surfaceId": "main", "path": "/x", "value": 1})),
        )
        .await
        .unwrap();
    assert_eq!(patched["error"]["code"], json!("SURFACE_NOT_OWNED"));

    let deleted = methods
        .call("surface.delete", Some(json!({"sessionId": other, "surfaceId": "main"})))
        .await
        .unwrap();
    assert_eq!(deleted["error"]["code"], json!("SURFACE_NOT_OWNED"));

    assert!(frames(&mut other_rx)
        .iter()
        .all(|frame| frame.get("connected").is_some()));
    assert_eq!(frames(&mut owner_rx).len(), 2, "handshake and createSurface");
    assert_eq!(
        state.sessions().read().await.session_for_surface("main"),
        Some(owner.as_str())
    );

    // without an explicit session the owner is targeted
    let patched = methods
        .call(
            "surface.updateDataModel",
            Some(json!({"surfaceId": "main", "path": "/x", "value": 1})),
        )
        .await
        .unwrap();
    assert_eq!(patched["success"], json!(true));
}
