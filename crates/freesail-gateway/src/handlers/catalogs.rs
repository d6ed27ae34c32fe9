//! Catalog RPC method handlers.

use super::{parse_params, HandlerContext};
use crate::error::GatewayError;
use crate::methods::MethodHandler;
use crate::Result;
use async_trait::async_trait;
use freesail_core::catalog::{self, Catalog};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Catalogs list method handler.
pub struct CatalogsListHandler {
    context: Arc<HandlerContext>,
}

impl CatalogsListHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for CatalogsListHandler {
    async fn call(&self, _params: Option<Value>) -> Result<Value> {
        let catalogs: Vec<Value> = self
            .context
            .state
            .catalogs()
            .await
            .iter()
            .map(|c| {
                json!({
                    "catalogId": c.id,
                    "title": c.title,
                    "components": c.components.keys().collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(json!({ "catalogs": catalogs }))
    }
}

/// Parameters naming a catalog.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRef {
    pub catalog_id: String,
}

async fn lookup(context: &HandlerContext, catalog_id: &str) -> Result<Catalog> {
    context
        .state
        .catalog(catalog_id)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("Catalog '{}'", catalog_id)))
}

/// Catalogs describe method handler.
pub struct CatalogsDescribeHandler {
    context: Arc<HandlerContext>,
}

impl CatalogsDescribeHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for CatalogsDescribeHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: CatalogRef = parse_params(params)?;
        let catalog = lookup(&self.context, &params.catalog_id).await?;
        Ok(serde_json::to_value(catalog::describe(&catalog))?)
    }
}

/// Parameters for catalogs.validate.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateParams {
    pub catalog_id: String,

    /// Component type; defaults to the instance's `component` field.
    #[serde(default)]
    pub component_type: Option<String>,

    pub component: Value,
}

/// Catalogs validate method handler.
pub struct CatalogsValidateHandler {
    context: Arc<HandlerContext>,
}

impl CatalogsValidateHandler {
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MethodHandler for CatalogsValidateHandler {
    async fn call(&self, params: Option<Value>) -> Result<Value> {
        let params: ValidateParams = parse_params(params)?;
        let catalog = lookup(&self.context, &params.catalog_id).await?;

        let component_type = params
            .component_type
            .or_else(|| {
                params
                    .component
                    .get("component")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                GatewayError::InvalidParams("componentType or component.component required".into())
            })?;

        let report = catalog::validate(&catalog, &component_type, &params.component);
        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::registry;
    use freesail_core::catalog::Catalog;
    use serde_json::json;

    fn button_catalog() -> Catalog {
        Catalog::new("cat1").with_component(
            "Button",
            json!({
                "description": "Clickable",
                "properties": {"label": {"type": "string"}, "action": {"type": "object"}},
                "required": ["label"]
            }),
        )
    }

    #[tokio::test]
    async fn test_catalog_methods() {
        let (registry, state) = registry().await;
        state.preload_catalogs(vec![button_catalog()]).await;

        let listed = registry.call("catalogs.list", None).await.unwrap();
        assert_eq!(listed["catalogs"][0]["catalogId"], json!("cat1"));
        assert_eq!(listed["catalogs"][0]["components"], json!(["Button"]));

        let summary = registry
            .call("catalogs.describe", Some(json!({"catalogId": "cat1"})))
            .await
            .unwrap();
        assert_eq!(summary["components"][0]["name"], json!("Button"));
        assert_eq!(summary["components"][0]["description"], json!("Clickable"));

        let report = registry
            .call(
                "catalogs.validate",
                Some(json!({"catalogId": "cat1", "component": {"id": "b", "component": "button"}})),
            )
            .await
            .unwrap();
        assert_eq!(report["valid"], json!(false));
        assert!(report["errors"][0].as_str().unwrap().contains("label"));

        let report = registry
            .call(
                "catalogs.validate",
                Some(json!({"catalogId": "cat1", "componentType": "Button", "component": {"label": "Go"}})),
            )
            .await
            .unwrap();
        assert_eq!(report, json!({"valid": true, "errors": []}));
    }

    #[tokio::test]
    async fn test_unknown_catalog_is_rpc_not_found() {
        let (registry, _state) = registry().await;
        let err = registry
            .call("catalogs.describe", Some(json!({"catalogId": "nope"})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32002);
    }
}
