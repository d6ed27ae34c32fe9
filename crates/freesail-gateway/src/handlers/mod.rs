//! RPC method handlers for agents.

pub mod actions;
pub mod catalogs;
pub mod sessions;
pub mod surfaces;

use crate::error::GatewayError;
use crate::methods::{register_builtin, MethodRegistry};
use crate::state::{GatewayState, OpResult};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub use actions::ActionsDrainHandler;
pub use catalogs::{CatalogsDescribeHandler, CatalogsListHandler, CatalogsValidateHandler};
pub use sessions::{SessionsClaimHandler, SessionsListHandler, SessionsReleaseHandler};
pub use surfaces::{
    SurfaceCreateHandler, SurfaceDeleteHandler, SurfaceGetHandler,
    SurfaceUpdateComponentsHandler, SurfaceUpdateDataModelHandler,
};

/// Shared context for method handlers.
#[derive(Clone)]
pub struct HandlerContext {
    /// Gateway state.
    pub state: Arc<GatewayState>,
}

impl HandlerContext {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

/// Register every method.
pub async fn register_all(registry: &MethodRegistry, context: HandlerContext) {
    let ctx = Arc::new(context);

    register_builtin(registry).await;

    // Session methods
    registry
        .register("sessions.list", Arc::new(SessionsListHandler::new(ctx.clone())))
        .await;
    registry
        .register("sessions.claim", Arc::new(SessionsClaimHandler::new(ctx.clone())))
        .await;
    registry
        .register("sessions.release", Arc::new(SessionsReleaseHandler::new(ctx.clone())))
        .await;

    // Action methods
    registry
        .register("actions.drain", Arc::new(ActionsDrainHandler::new(ctx.clone())))
        .await;

    // Surface methods
    registry
        .register("surface.create", Arc::new(SurfaceCreateHandler::new(ctx.clone())))
        .await;
    registry
        .register(
            "surface.updateComponents",
            Arc::new(SurfaceUpdateComponentsHandler::new(ctx.clone())),
        )
        .await;
    registry
        .register(
            "surface.updateDataModel",
            Arc::new(SurfaceUpdateDataModelHandler::new(ctx.clone())),
        )
        .await;
    registry
        .register("surface.delete", Arc::new(SurfaceDeleteHandler::new(ctx.clone())))
        .await;
    registry
        .register("surface.get", Arc::new(SurfaceGetHandler::new(ctx.clone())))
        .await;

    // Catalog methods
    registry
        .register("catalogs.list", Arc::new(CatalogsListHandler::new(ctx.clone())))
        .await;
    registry
        .register("catalogs.describe", Arc::new(CatalogsDescribeHandler::new(ctx.clone())))
        .await;
    registry
        .register("catalogs.validate", Arc::new(CatalogsValidateHandler::new(ctx)))
        .await;
}

/// Deserialize required parameters.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params =
        params.ok_or_else(|| GatewayError::InvalidParams("Missing parameters".to_string()))?;
    serde_json::from_value(params).map_err(|e| GatewayError::InvalidParams(e.to_string()))
}

/// Deserialize parameters that may be omitted entirely.
pub(crate) fn parse_optional_params<T: DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(params) => serde_json::from_value(params)
            .map_err(|e| GatewayError::InvalidParams(e.to_string())),
    }
}

/// Render a domain result as `{success: true, ...fields}` or
/// `{success: false, error}`.
pub(crate) fn op_response<T: Serialize>(result: OpResult<T>) -> Result<Value> {
    match result {
        Ok(value) => {
            let mut body = Map::new();
            body.insert("success".to_string(), Value::Bool(true));
            match serde_json::to_value(value)? {
                Value::Object(fields) => body.extend(fields),
                Value::Null => {}
                other => {
                    body.insert("result".to_string(), other);
                }
            }
            Ok(Value::Object(body))
        }
        Err(err) => Ok(err.to_result()),
    }
}

/// Resolve the session a surface operation targets.
///
/// An explicit session id is passed through and checked against the
/// surface's owner by the state; otherwise the owner is used.
pub(crate) async fn target_session(
    state: &GatewayState,
    session_id: Option<String>,
    surface_id: &str,
) -> OpResult<String> {
    if let Some(session_id) = session_id {
        return Ok(session_id);
    }
    state
        .surface_owner(surface_id)
        .await
        .ok_or_else(|| freesail_core::protocol::OperationError::surface_not_found(surface_id))
}


#[cfg(test)]
mod tests {
    use super::*;
    use freesail_core::protocol::OperationError;
    use serde_json::json;

    #[test]
    fn test_op_response_shapes() {
        let ok = op_response::<Value>(Ok(json!({"created": true}))).unwrap();
        assert_eq!(ok, json!({"success": true, "created": true}));

        let unit = op_response(Ok(())).unwrap();
        assert_eq!(unit, json!({"success": true}));

        let err = op_response::<()>(Err(OperationError::surface_not_found("main"))).unwrap();
        assert_eq!(err["success"], json!(false));
        assert_eq!(err["error"]["code"], json!("SURFACE_NOT_FOUND"));
    }

    #[test]
    fn test_parse_params_errors() {
        #[derive(serde::Deserialize, Debug)]
        struct P {
            #[allow(dead_code)]
            x: u32,
        }
        assert!(matches!(
            parse_params::<P>(None),
            Err(GatewayError::InvalidParams(_))
        ));
        assert!(matches!(
            parse_params::<P>(Some(json!({"x": "nope"}))),
            Err(GatewayError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_register_all_exposes_methods() {
        let (registry, _state) = test_support::registry().await;
        let methods = registry.list().await;
        for name in [
            "ping",
            "system.info",
            "sessions.list",
            "sessions.claim",
            "sessions.release",
            "actions.drain",
            "surface.create",
            "surface.updateComponents",
            "surface.updateDataModel",
            "surface.delete",
            "surface.get",
            "catalogs.list",
            "catalogs.describe",
            "catalogs.validate",
        ] {
            assert!(methods.iter().any(|m| m == name), "missing {}", name);
        }
    }
}
