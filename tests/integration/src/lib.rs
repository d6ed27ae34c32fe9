//! Helpers shared by the integration test binaries.

use freesail_core::Config;
use freesail_gateway::{ChannelOutput, Gateway, GatewayState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Config that preloads nothing from the user's home directory.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.gateway.catalogs_dir = Some(PathBuf::from("/nonexistent/freesail-catalogs"));
    config
}

/// Connect an in-process client session.
pub async fn connect(state: &GatewayState) -> (String, UnboundedReceiver<String>) {
    let (output, rx) = ChannelOutput::new();
    let session_id = state
        .create_session(Arc::new(output), None)
        .await
        .expect("session");
    (session_id, rx)
}

/// Drain every frame currently buffered on a client channel.
pub fn frames(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let Ok(value) = serde_json::from_str(frame.trim()) {
            out.push(value);
        }
    }
    out
}

/// Serve a gateway on an ephemeral loopback port.
pub async fn serve(gateway: &Gateway) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = gateway.router();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });
    addr
}

/// Call a JSON-RPC method over `POST /rpc`.
pub async fn rpc(addr: SocketAddr, method: &str, params: Value) -> Value {
    let response: Value = reqwest::Client::new()
        .post(format!("http://{}/rpc", addr))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
        .send()
        .await
        .expect("rpc request")
        .json()
        .await
        .expect("rpc response");
    response["result"].clone()
}
