//! Action mailbox RPC method handlers.

use super::{op_response, parse_optional_params, HandlerContext};
use crate::methods::MethodHandler;
use crate::state::DrainedBatch;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Parameters for actions.drain.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainParams {
    /// Agent draining; unclaimed sessions are always included.
    pub agent_id: Option<String>,

    /// Drain only this session.
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct DrainResult {
    count: usize,
    batches: Vec<DrainedBatch>,
}

/// Actions drain method handler.
pub struct ActionsDrainHandler {
    context: Arc<HandlerContext>,
}

impl ActionsDrainHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    async fn drain_one(&self, agent_id: Option<&str>, session_id: &str) -> Result<Value> {
        let batch = match self.context.state.drain_session_for(agent_id, session_id).await {
            Ok(batch) => batch,
            Err(e) => return op_response::<()>(Err(e)),
        };
        let batches: Vec<DrainedBatch> = batch.into_iter().collect();
        op_response(Ok(DrainResult {
            count: batches.iter().map(|b| b.actions.len()).sum(),
            batches,
        }))
    }
}

#[async_trait]
impl MethodHandler for ActionsDrainHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: DrainParams = parse_optional_params(params)?;
        let agent_id = params.agent_id.as_deref();

        if let Some(session_id) = &params.session_id {
            return self.drain_one(agent_id, session_id).await;
        }

        let batches = self.context.state.drain_for_agent(agent_id).await;
        op_response(Ok(DrainResult {
            count: batches.iter().map(|b| b.actions.len()).sum(),
            batches,
        }))
    }
}
