//! Session RPC method handlers.

use super::{op_response, parse_params, HandlerContext};
use crate::methods::MethodHandler;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Sessions list method handler.
pub struct SessionsListHandler {
    context: Arc<HandlerContext>,
}

impl SessionsListHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SessionsListHandler {
    async fn call(&self, _params: Option<Value>) -> Result<Value> {
        let sessions = self.context.state.list_sessions().await;
        Ok(json!({
            "total": sessions.len(),
            "sessions": sessions,
        }))
    }
}

/// Parameters for sessions.claim and sessions.release.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimParams {
    pub agent_id: String,
    pub session_id: String,
}

/// Sessions claim method handler.
pub struct SessionsClaimHandler {
    context: Arc<HandlerContext>,
}

impl SessionsClaimHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SessionsClaimHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: ClaimParams = parse_params(params)?;
        debug!("Claim request: {} -> {}", params.agent_id, params.session_id);

        op_response(
            self.context
                .state
                .claim(&params.agent_id, &params.session_id)
                .await,
        )
    }
}

/// Sessions release method handler.
pub struct SessionsReleaseHandler {
    context: Arc<HandlerContext>,
}

impl SessionsReleaseHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SessionsReleaseHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: ClaimParams = parse_params(params)?;
        let released = self
            .context
            .state
            .release(&params.agent_id, &params.session_id)
            .await;
        Ok(json!({
            "success": true,
            "released": released,
        }))
    }
}
