//! RPC method registry and built-in methods.

use crate::error::GatewayError;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for RPC method handlers.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Handle the method call.
    async fn call(&self, params: Option<Value>) -> Result<Value>;
}

/// Registry for RPC methods.
#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<dyn MethodHandler>>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method handler, replacing any previous one.
    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        let mut methods = self.methods.write().await;
        methods.insert(name.into(), handler);
    }

    /// Call a method.
    pub async fn call(&self, name: &str, params: Option<Value>) -> Result<Value> {
        let handler = {
            let methods = self.methods.read().await;
            methods
                .get(name)
                .cloned()
                .ok_or_else(|| GatewayError::MethodNotFound(name.to_string()))?
        };

        debug!("Calling method: {}", name);
        handler.call(params).await
    }

    /// Registered method names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let methods = self.methods.read().await;
        let mut names: Vec<String> = methods.keys().cloned().collect();
        names.sort();
        names
    }
}

/// `ping`.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn call(&self, _params: Option<Value>) -> Result<Value> {
        Ok(json!({
            "pong": true,
            "timestamp": freesail_core::id::timestamp(),
        }))
    }
}

/// `system.info`.
pub struct SystemInfoHandler;

#[async_trait]
impl MethodHandler for SystemInfoHandler {
    async fn call(&self, _params: Option<Value>) -> Result<Value> {
        Ok(json!({
            "name": "freesail-gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }))
    }
}

/// Register methods that need no gateway state.
pub async fn register_builtin(registry: &MethodRegistry) {
    registry.register("ping", Arc::new(PingHandler)).await;
    registry
        .register("system.info", Arc::new(SystemInfoHandler))
        .await;
}
