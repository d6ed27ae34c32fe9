//! Surface RPC method handlers.
//!
//! Every mutation is checked against the session's catalog scope and, when
//! the catalog is known, validated before it reaches the Surface Store.

use super::{op_response, parse_params, target_session, HandlerContext};
use crate::methods::MethodHandler;
use crate::Result;
use async_trait::async_trait;
use freesail_core::component::Component;
use freesail_core::protocol::{OperationError, UpdateDataModel};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Parameters for surface.create.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    pub session_id: String,
    pub surface_id: String,
    pub catalog_id: String,
    #[serde(default)]
    pub send_data_model: bool,
    #[serde(default)]
    pub theme: Option<Value>,
}

/// Surface create method handler.
pub struct SurfaceCreateHandler {
    context: Arc<HandlerContext>,
}

impl SurfaceCreateHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SurfaceCreateHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: CreateParams = parse_params(params)?;
        debug!(
            "Create surface {} on {} (catalog {})",
            params.surface_id, params.session_id, params.catalog_id
        );

        let result = self
            .context
            .state
            .create_surface(
                &params.session_id,
                &params.surface_id,
                &params.catalog_id,
                params.send_data_model,
                params.theme,
            )
            .await;
        op_response(result.map(|created| json!({"surfaceId": params.surface_id, "created": created})))
    }
}

/// Parameters for surface.updateComponents.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComponentsParams {
    #[serde(default)]
    pub session_id: Option<String>,
    pub surface_id: String,
    pub components: Vec<Component>,
}

/// Surface updateComponents method handler.
pub struct SurfaceUpdateComponentsHandler {
    context: Arc<HandlerContext>,
}

impl SurfaceUpdateComponentsHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SurfaceUpdateComponentsHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: UpdateComponentsParams = parse_params(params)?;
        let state = &self.context.state;

        let session_id = match target_session(state, params.session_id, &params.surface_id).await {
            Ok(id) => id,
            Err(e) => return op_response::<()>(Err(e)),
        };
        let count = params.components.len();
        let result = state
            .update_components(&session_id, &params.surface_id, params.components)
            .await;
        op_response(result.map(|()| json!({"updated": count})))
    }
}

/// Parameters for surface.updateDataModel.
///
/// An absent `value` deletes the addressed location.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataModelParams {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub patch: UpdateDataModel,
}

/// Surface updateDataModel method handler.
pub struct SurfaceUpdateDataModelHandler {
    context: Arc<HandlerContext>,
}

impl SurfaceUpdateDataModelHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SurfaceUpdateDataModelHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: UpdateDataModelParams = parse_params(params)?;
        let state = &self.context.state;
        let patch = params.patch;

        let session_id = match target_session(state, params.session_id, &patch.surface_id).await {
            Ok(id) => id,
            Err(e) => return op_response::<()>(Err(e)),
        };
        op_response(
            state
                .update_data_model(&session_id, &patch.surface_id, patch.path, patch.value)
                .await,
        )
    }
}

/// Parameters for surface.delete and surface.get.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceRef {
    #[serde(default)]
    pub session_id: Option<String>,
    pub surface_id: String,
}

/// Surface delete method handler.
pub struct SurfaceDeleteHandler {
    context: Arc<HandlerContext>,
}

impl SurfaceDeleteHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SurfaceDeleteHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: SurfaceRef = parse_params(params)?;
        let state = &self.context.state;

        let session_id = match target_session(state, params.session_id, &params.surface_id).await {
            Ok(id) => id,
            Err(e) => return op_response::<()>(Err(e)),
        };
        op_response(state.delete_surface(&session_id, &params.surface_id).await)
    }
}

/// Surface get method handler.
pub struct SurfaceGetHandler {
    context: Arc<HandlerContext>,
}

impl SurfaceGetHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for SurfaceGetHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: SurfaceRef = parse_params(params)?;
        let state = &self.context.state;

        let surface = state
            .get_surface(&params.surface_id)
            .await
            .ok_or_else(|| OperationError::surface_not_found(&params.surface_id));
        let owner = state.surface_owner(&params.surface_id).await;
        op_response(surface.map(|surface| json!({"surface": surface, "sessionId": owner})))
    }
}
