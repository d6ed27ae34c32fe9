//! Shared gateway state and the operations agents and clients invoke on it.
//!
//! Locks are always taken in the order sessions → surfaces, and no lock is
//! held across an await on anything but the other lock.

use crate::error::GatewayError;
use crate::output::OutputChannel;
use crate::session::{Session, SessionRegistry};
use crate::stats::{GatewayStats, StatsSnapshot};
use crate::surface::{Surface, SurfaceStore};
use crate::Result;
use freesail_core::catalog::{self, Catalog};
use freesail_core::component::Component;
use freesail_core::protocol::{
    encode, CreateSurface, DeleteSurface, DownstreamMessage, ErrorCode, Handshake,
    OperationError, UpdateComponents, UpdateDataModel, UpstreamMessage, UserAction,
    SESSION_DISCONNECTED,
};
use freesail_core::{id, Config};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of a domain operation: a value or a structured failure.
pub type OpResult<T> = std::result::Result<T, OperationError>;

/// Process-wide gateway state.
pub struct GatewayState {
    /// Configuration.
    pub config: Config,

    sessions: RwLock<SessionRegistry>,
    surfaces: RwLock<SurfaceStore>,
    stats: GatewayStats,
    started_at: Instant,
}

/// Summary of a session for agents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub surfaces: Vec<String>,
    pub catalogs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub pending_actions: usize,
    pub connected_at: String,
    pub idle_secs: u64,
}

/// Actions drained from one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainedBatch {
    pub session_id: String,
    pub actions: Vec<UpstreamMessage>,

    /// Data models of the session's surfaces flagged `sendDataModel`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data_models: BTreeMap<String, Value>,
}

impl GatewayState {
    /// Create empty state.
    pub fn new(config: Config) -> Self {
        let sessions = SessionRegistry::new();
        let surfaces = SurfaceStore::new();
        let stats = GatewayStats::attach(sessions.events(), surfaces.events());
        Self {
            config,
            sessions: RwLock::new(sessions),
            surfaces: RwLock::new(surfaces),
            stats,
            started_at: Instant::now(),
        }
    }

    /// Session registry lock.
    pub fn sessions(&self) -> &RwLock<SessionRegistry> {
        &self.sessions
    }

    /// Surface store lock.
    pub fn surfaces(&self) -> &RwLock<SurfaceStore> {
        &self.surfaces
    }

    /// Lifecycle counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Open a session on `output`, writing the handshake frame first.
    pub async fn create_session(
        &self,
        output: Arc<dyn OutputChannel>,
        capabilities: Option<Vec<String>>,
    ) -> Result<String> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.gateway.max_connections {
            warn!(
                "Max connections ({}) reached, rejecting session",
                self.config.gateway.max_connections
            );
            return Err(GatewayError::Capacity(format!(
                "limit of {} sessions reached",
                self.config.gateway.max_connections
            )));
        }

        let session_id = id::session_id();
        output.send(&encode(&Handshake::new(&session_id))?)?;
        if !sessions.create_session(&session_id, output, capabilities) {
            return Err(GatewayError::Internal(format!(
                "session id '{}' already in use",
                session_id
            )));
        }
        Ok(session_id)
    }

    /// Disconnect a session: tell every other session it left, then remove it.
    pub async fn disconnect_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        disconnect_locked(&mut sessions, session_id)
    }

    /// Record client activity.
    pub async fn touch(&self, session_id: &str) -> bool {
        self.sessions.write().await.touch(session_id)
    }

    /// Route an upstream message from a client.
    ///
    /// A known `session_id` is used directly; otherwise the message is routed
    /// by the surface it names.
    pub async fn enqueue_upstream(
        &self,
        session_id: Option<&str>,
        message: UpstreamMessage,
    ) -> OpResult<String> {
        let mut sessions = self.sessions.write().await;

        if let Some(session_id) = session_id.filter(|id| sessions.contains(id)) {
            sessions.touch(session_id);
            sessions.enqueue_action(session_id, message);
            return Ok(session_id.to_string());
        }

        let surface_id = message.surface_id().to_string();
        match sessions.enqueue_action_by_surface(message) {
            Some(owner) => {
                sessions.touch(&owner);
                Ok(owner)
            }
            None => match session_id {
                Some(session_id) => Err(OperationError::session_not_found(session_id)),
                None => Err(OperationError::new(
                    ErrorCode::SurfaceNotFound,
                    format!("Surface '{}' is not owned by any session", surface_id),
                )),
            },
        }
    }

    /// Register catalogs supplied by a client.
    pub async fn register_catalogs(
        &self,
        session_id: &str,
        catalogs: Vec<Catalog>,
    ) -> OpResult<Vec<String>> {
        let mut sessions = self.sessions.write().await;
        sessions.touch(session_id);
        sessions.register_catalogs(session_id, catalogs)
    }

    /// Store catalogs globally without scoping them to a session.
    pub async fn preload_catalogs(&self, catalogs: Vec<Catalog>) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = catalogs.len();
        for catalog in catalogs {
            sessions.insert_catalog(catalog);
        }
        count
    }

    /// Create or update a surface on a session and push `createSurface`.
    pub async fn create_surface(
        &self,
        session_id: &str,
        surface_id: &str,
        catalog_id: &str,
        send_data_model: bool,
        theme: Option<Value>,
    ) -> OpResult<bool> {
        if !id::is_valid_id(surface_id) {
            return Err(OperationError::new(
                ErrorCode::ValidationFailed,
                format!("Invalid surface id '{}'", surface_id),
            ));
        }

        let mut sessions = self.sessions.write().await;
        if !sessions.contains(session_id) {
            return Err(OperationError::session_not_found(session_id));
        }
        if let Some(reason) = sessions.validate_catalog_for_session(session_id, catalog_id) {
            return Err(OperationError::new(ErrorCode::CatalogNotAllowed, reason));
        }
        if sessions
            .session_for_surface(surface_id)
            .is_some_and(|owner| owner != session_id)
        {
            return Err(OperationError::surface_not_owned(surface_id, session_id));
        }

        let created = self.surfaces.write().await.create_or_update(
            surface_id,
            catalog_id,
            Some(send_data_model),
            theme.clone(),
        );
        sessions.bind_surface(session_id, surface_id, catalog_id);

        let frame = DownstreamMessage::CreateSurface(CreateSurface {
            surface_id: surface_id.to_string(),
            catalog_id: catalog_id.to_string(),
            send_data_model,
            theme,
        });
        push(&mut sessions, session_id, &frame);
        Ok(created)
    }

    /// Merge components into a surface after catalog validation and push
    /// `updateComponents`.
    pub async fn update_components(
        &self,
        session_id: &str,
        surface_id: &str,
        components: Vec<Component>,
    ) -> OpResult<()> {
        let mut sessions = self.sessions.write().await;
        require_owner(&sessions, session_id, surface_id)?;
        let mut surfaces = self.surfaces.write().await;
        let Some(catalog_id) = surfaces.get(surface_id).map(|s| s.catalog_id.clone()) else {
            return Err(OperationError::surface_not_found(surface_id));
        };
        if let Some(reason) = sessions.validate_catalog_for_session(session_id, &catalog_id) {
            return Err(OperationError::new(ErrorCode::CatalogNotAllowed, reason));
        }

        if let Some(catalog) = sessions.catalog(&catalog_id) {
            let errors = validate_components(catalog, &components);
            if !errors.is_empty() {
                return Err(OperationError::new(
                    ErrorCode::ValidationFailed,
                    format!(
                        "{} component(s) failed validation against catalog '{}'",
                        errors.len(),
                        catalog_id
                    ),
                )
                .with_errors(errors));
            }
        } else {
            debug!("Catalog '{}' unknown, skipping component validation", catalog_id);
        }

        surfaces.replace_components(surface_id, components.clone());
        drop(surfaces);

        let frame = DownstreamMessage::UpdateComponents(UpdateComponents {
            surface_id: surface_id.to_string(),
            components,
        });
        push(&mut sessions, session_id, &frame);
        Ok(())
    }

    /// Patch a surface's data model and push `updateDataModel`.
    ///
    /// `path` defaults to the root; a `None` value deletes.
    pub async fn update_data_model(
        &self,
        session_id: &str,
        surface_id: &str,
        path: Option<String>,
        value: Option<Value>,
    ) -> OpResult<()> {
        let mut sessions = self.sessions.write().await;
        require_owner(&sessions, session_id, surface_id)?;

        let pointer = path.clone().unwrap_or_else(|| "/".to_string());
        let patched = self
            .surfaces
            .write()
            .await
            .patch_data(surface_id, &pointer, value.clone())
            .map_err(|e| OperationError::new(ErrorCode::InvalidPath, e.to_string()))?;
        if !patched {
            return Err(OperationError::surface_not_found(surface_id));
        }

        let frame = DownstreamMessage::UpdateDataModel(UpdateDataModel {
            surface_id: surface_id.to_string(),
            path,
            value,
        });
        push(&mut sessions, session_id, &frame);
        Ok(())
    }

    /// Delete a surface and push `deleteSurface` to its owner.
    pub async fn delete_surface(&self, session_id: &str, surface_id: &str) -> OpResult<()> {
        let mut sessions = self.sessions.write().await;
        require_owner(&sessions, session_id, surface_id)?;
        if !self.surfaces.write().await.delete(surface_id) {
            return Err(OperationError::surface_not_found(surface_id));
        }
        sessions.unbind_surface(surface_id);

        let frame = DownstreamMessage::DeleteSurface(DeleteSurface {
            surface_id: surface_id.to_string(),
        });
        push(&mut sessions, session_id, &frame);
        Ok(())
    }

    /// Snapshot of a surface.
    pub async fn get_surface(&self, surface_id: &str) -> Option<Surface> {
        self.surfaces.read().await.get(surface_id).cloned()
    }

    /// Session that owns a surface.
    pub async fn surface_owner(&self, surface_id: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .session_for_surface(surface_id)
            .map(str::to_string)
    }

    /// Claim a session for an agent.
    pub async fn claim(&self, agent_id: &str, session_id: &str) -> OpResult<()> {
        self.sessions.write().await.claim(agent_id, session_id)
    }

    /// Release an agent's claim.
    pub async fn release(&self, agent_id: &str, session_id: &str) -> bool {
        self.sessions.write().await.release(agent_id, session_id)
    }

    /// Drain one session's mailbox.
    pub async fn drain_session(&self, session_id: &str) -> OpResult<Vec<UpstreamMessage>> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains(session_id) {
            return Err(OperationError::session_not_found(session_id));
        }
        Ok(sessions.dequeue_all(session_id))
    }

    /// Drain one session on behalf of an agent.
    ///
    /// The claim check, the dequeue and the data model snapshot happen under
    /// one write lock, so a claim taken concurrently cannot be drained by
    /// another agent. Returns `None` when nothing was pending.
    pub async fn drain_session_for(
        &self,
        agent_id: Option<&str>,
        session_id: &str,
    ) -> OpResult<Option<DrainedBatch>> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains(session_id) {
            return Err(OperationError::session_not_found(session_id));
        }
        if let Some(holder) = sessions.holder(session_id).filter(|h| Some(*h) != agent_id) {
            return Err(OperationError::new(
                ErrorCode::AlreadyClaimed,
                format!("Session '{}' is claimed by agent '{}'", session_id, holder),
            ));
        }

        let actions = sessions.dequeue_all(session_id);
        if actions.is_empty() {
            return Ok(None);
        }
        let sendable = self.surfaces.read().await.get_all_sendable();
        let data_models = sessions
            .get(session_id)
            .map(|session| sendable_for(session, &sendable))
            .unwrap_or_default();

        Ok(Some(DrainedBatch {
            session_id: session_id.to_string(),
            actions,
            data_models,
        }))
    }

    /// Drain every session visible to an agent.
    ///
    /// Sessions claimed by `agent_id` and unclaimed sessions are drained;
    /// sessions held by other agents are skipped. Sessions with nothing
    /// pending are omitted.
    pub async fn drain_for_agent(&self, agent_id: Option<&str>) -> Vec<DrainedBatch> {
        let mut sessions = self.sessions.write().await;
        let surfaces = self.surfaces.read().await;
        let sendable = surfaces.get_all_sendable();

        let mut batches = Vec::new();
        for session_id in sessions.session_ids() {
            let visible = match sessions.holder(&session_id) {
                None => true,
                Some(holder) => Some(holder) == agent_id,
            };
            if !visible {
                continue;
            }

            let actions = sessions.dequeue_all(&session_id);
            if actions.is_empty() {
                continue;
            }

            let data_models = sessions
                .get(&session_id)
                .map(|session| sendable_for(session, &sendable))
                .unwrap_or_default();

            batches.push(DrainedBatch {
                session_id,
                actions,
                data_models,
            });
        }
        batches
    }

    /// Describe every session.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let now = Instant::now();
        sessions
            .session_ids()
            .into_iter()
            .filter_map(|session_id| {
                let session = sessions.get(&session_id)?;
                Some(SessionInfo {
                    surfaces: session.surfaces.iter().cloned().collect(),
                    catalogs: session.catalogs.iter().cloned().collect(),
                    capabilities: session.capabilities.clone(),
                    claimed_by: sessions.holder(&session_id).map(str::to_string),
                    pending_actions: sessions.pending(&session_id),
                    connected_at: session.connected_at.to_rfc3339(),
                    idle_secs: session.idle_for(now).as_secs(),
                    session_id,
                })
            })
            .collect()
    }

    /// Every known catalog.
    pub async fn catalogs(&self) -> Vec<Catalog> {
        self.sessions.read().await.catalogs().cloned().collect()
    }

    /// One catalog by id.
    pub async fn catalog(&self, catalog_id: &str) -> Option<Catalog> {
        self.sessions.read().await.catalog(catalog_id).cloned()
    }

    /// Remove sessions idle past the configured timeout.
    pub async fn sweep_stale(&self) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let stale = sessions.stale_sessions(Instant::now(), self.config.session.idle_timeout());
        for session_id in &stale {
            info!("Evicting idle session {}", session_id);
            disconnect_locked(&mut sessions, session_id);
        }
        stale
    }

    /// Run [`sweep_stale`](Self::sweep_stale) on the configured interval.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);
        let period = self.config.session.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let evicted = state.sweep_stale().await;
                if !evicted.is_empty() {
                    debug!("Sweep evicted {} session(s)", evicted.len());
                }
            }
        })
    }

    /// Counts reported by health checks.
    pub async fn counts(&self) -> (usize, usize) {
        let sessions = self.sessions.read().await.len();
        let surfaces = self.surfaces.read().await.len();
        (sessions, surfaces)
    }
}

/// Require a live session that owns the surface.
fn require_owner(sessions: &SessionRegistry, session_id: &str, surface_id: &str) -> OpResult<()> {
    if !sessions.contains(session_id) {
        return Err(OperationError::session_not_found(session_id));
    }
    match sessions.session_for_surface(surface_id) {
        Some(owner) if owner == session_id => Ok(()),
        Some(_) => Err(OperationError::surface_not_owned(surface_id, session_id)),
        None => Err(OperationError::surface_not_found(surface_id)),
    }
}

fn disconnect_locked(sessions: &mut SessionRegistry, session_id: &str) -> bool {
    if !sessions.contains(session_id) {
        return false;
    }
    let notice = UpstreamMessage::Action(UserAction::synthetic(
        SESSION_DISCONNECTED,
        SessionRegistry::session_context(session_id),
    ));
    let notified = sessions.broadcast_action(session_id, &notice);
    debug!("Notified {} session(s) that {} left", notified, session_id);
    sessions.remove_session(session_id)
}

fn sendable_for(session: &Session, sendable: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    session
        .surfaces
        .iter()
        .filter_map(|id| sendable.get(id).map(|model| (id.clone(), model.clone())))
        .collect()
}

/// Push a frame to a session. A failed push removes the session; the
/// mutation that produced the frame stands.
fn push(sessions: &mut SessionRegistry, session_id: &str, frame: &DownstreamMessage) {
    let line = match encode(frame) {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to encode frame for {}: {}", session_id, e);
            return;
        }
    };
    if let Err(e) = sessions.send(session_id, &line) {
        warn!("Push to session {} failed, removing: {}", session_id, e);
        disconnect_locked(sessions, session_id);
    }
}

fn validate_components(catalog: &Catalog, components: &[Component]) -> Vec<String> {
    components
        .iter()
        .flat_map(|component| {
            let report = catalog::validate(catalog, &component.component, &component.to_value());
            report
                .errors
                .into_iter()
                .map(move |error| format!("{}: {}", component.id, error))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ChannelOutput;
    use freesail_core::component::DynamicValue;
    use freesail_core::protocol::{StreamParser, SESSION_CONNECTED};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn connect(state: &GatewayState) -> (String, UnboundedReceiver<String>) {
        let (output, rx) = ChannelOutput::new();
        let id = state.create_session(Arc::new(output), None).await.unwrap();
        (id, rx)
    }

    fn frames(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        let mut parser = StreamParser::default();
        let mut out = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            out.extend(parser.parse_values(chunk.as_bytes()).messages);
        }
        out
    }

    fn action_names(actions: &[UpstreamMessage]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|m| match m {
                UpstreamMessage::Action(a) => Some(a.name.clone()),
                _ => None,
            })
            .collect()
    }

    fn text_catalog() -> Catalog {
        Catalog::new("cat1").with_component(
            "Text",
            json!({
                "properties": {"component": {"const": "Text"}, "text": {"type": "string"}},
                "required": ["component", "text"]
            }),
        )
    }

    #[tokio::test]
    async fn test_session_handshake_and_connected_action() {
        let state = GatewayState::new(Config::default());
        let (id, mut rx) = connect(&state).await;

        let frames = frames(&mut rx);
        assert_eq!(frames[0], json!({"connected": true, "sessionId": id}));

        let drained = state.drain_session(&id).await.unwrap();
        assert_eq!(action_names(&drained), vec![SESSION_CONNECTED]);
    }

    #[tokio::test]
    async fn test_surface_lifecycle_pushes_frames() {
        let state = GatewayState::new(Config::default());
        let (id, mut rx) = connect(&state).await;

        assert!(state.create_surface(&id, "main", "cat1", false, None).await.unwrap());
        state
            .update_components(
                &id,
                "main",
                vec![Component::new("root", "Text").with_property("text", DynamicValue::literal("Hi"))],
            )
            .await
            .unwrap();
        state
            .update_data_model(&id, "main", Some("/title".into()), Some(json!("Hi")))
            .await
            .unwrap();
        state.delete_surface(&id, "main").await.unwrap();

        let frames = frames(&mut rx);
        let kinds: Vec<&str> = frames
            .iter()
            .map(|f| f.as_object().unwrap().keys().next().unwrap().as_str())
            .collect();
        assert_eq!(
            kinds,
            vec!["connected", "createSurface", "updateComponents", "updateDataModel", "deleteSurface"]
        );
        assert_eq!(frames[3]["updateDataModel"]["path"], json!("/title"));
    }

    #[tokio::test]
    async fn test_update_components_validates_against_known_catalog() {
        let state = GatewayState::new(Config::default());
        let (id, _rx) = connect(&state).await;
        state
            .register_catalogs(&id, vec![text_catalog()])
            .await
            .unwrap();
        state.create_surface(&id, "main", "cat1", false, None).await.unwrap();

        let err = state
            .update_components(&id, "main", vec![Component::new("root", "Text")])
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.errors[0].starts_with("root: "), "{:?}", err.errors);
        assert!(state.get_surface("main").await.unwrap().components.is_empty());

        state
            .update_components(
                &id,
                "main",
                vec![Component::new("root", "Text").with_property("text", DynamicValue::binding("/t"))],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_catalog_scoping_rejects_unregistered() {
        let state = GatewayState::new(Config::default());
        let (id, _rx) = connect(&state).await;
        state
            .register_catalogs(&id, vec![text_catalog()])
            .await
            .unwrap();

        let err = state
            .create_surface(&id, "main", "other", false, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CatalogNotAllowed);
    }

    #[tokio::test]
    async fn test_missing_surface_and_session_errors() {
        let state = GatewayState::new(Config::default());
        let (id, _rx) = connect(&state).await;

        let err = state
            .update_data_model(&id, "ghost", None, Some(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SurfaceNotFound);

        let err = state.delete_surface("nobody", "ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionNotFound);

        let err = state
            .create_surface(&id, "bad id", "cat1", false, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_mutations_require_surface_owner() {
        let state = GatewayState::new(Config::default());
        let (a, mut rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;
        state.create_surface(&b, "main", "cat1", false, None).await.unwrap();
        frames(&mut rx_a);
        frames(&mut rx_b);

        let err = state
            .update_data_model(&a, "main", Some("/x".into()), Some(json!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SurfaceNotOwned);

        let err = state
            .update_components(&a, "main", vec![Component::new("root", "Text")])
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SurfaceNotOwned);

        let err = state.delete_surface(&a, "main").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SurfaceNotOwned);

        let surface = state.get_surface("main").await.unwrap();
        assert_eq!(surface.data_model, json!({}));
        assert!(surface.components.is_empty());
        assert!(frames(&mut rx_a).is_empty());
        assert!(frames(&mut rx_b).is_empty());

        state.delete_surface(&b, "main").await.unwrap();
        assert_eq!(frames(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_create_surface_owned_elsewhere_is_rejected() {
        let state = GatewayState::new(Config::default());
        let (a, _rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;
        assert!(state.create_surface(&a, "main", "cat1", false, None).await.unwrap());
        frames(&mut rx_b);

        let err = state
            .create_surface(&b, "main", "cat1", true, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SurfaceNotOwned);
        assert!(frames(&mut rx_b).is_empty());

        assert_eq!(state.surface_owner("main").await.as_deref(), Some(a.as_str()));
        assert!(!state.get_surface("main").await.unwrap().send_data_model);

        // the owner may still update its own surface
        assert!(!state.create_surface(&a, "main", "cat1", true, None).await.unwrap());
        assert!(state.get_surface("main").await.unwrap().send_data_model);

        // once the owner leaves, the id may be taken over
        state.disconnect_session(&a).await;
        assert!(!state.create_surface(&b, "main", "cat1", false, None).await.unwrap());
        assert_eq!(state.surface_owner("main").await.as_deref(), Some(b.as_str()));
    }

    #[tokio::test]
    async fn test_drain_session_for_checks_claim_under_one_lock() {
        let state = GatewayState::new(Config::default());
        let (id, _rx) = connect(&state).await;
        state.create_surface(&id, "form", "cat1", true, None).await.unwrap();
        state
            .update_data_model(&id, "form", Some("/name".into()), Some(json!("Ada")))
            .await
            .unwrap();
        state.claim("owner", &id).await.unwrap();

        let err = state
            .drain_session_for(Some("intruder"), &id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyClaimed);
        let err = state.drain_session_for(None, &id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyClaimed);
        assert_eq!(state.sessions().read().await.pending(&id), 1);

        let batch = state
            .drain_session_for(Some("owner"), &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action_names(&batch.actions), vec![SESSION_CONNECTED]);
        assert_eq!(batch.data_models["form"], json!({"name": "Ada"}));

        assert!(state.drain_session_for(Some("owner"), &id).await.unwrap().is_none());
        let err = state.drain_session_for(None, "ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn test_concurrent_claim_and_drain_never_leak() {
        let state = Arc::new(GatewayState::new(Config::default()));
        for _ in 0..50 {
            let (id, _rx) = connect(&state).await;

            let claimer = {
                let state = Arc::clone(&state);
                let id = id.clone();
                tokio::spawn(async move { state.claim("y", &id).await })
            };
            let drainer = {
                let state = Arc::clone(&state);
                let id = id.clone();
                tokio::spawn(async move { state.drain_session_for(Some("x"), &id).await })
            };

            let claimed = claimer.await.unwrap().is_ok();
            let drained = drainer.await.unwrap();
            assert!(claimed);
            match drained {
                // x drained first, while the session was still unclaimed
                Ok(Some(_)) => assert_eq!(state.sessions().read().await.pending(&id), 0),
                Ok(None) => panic!("connected notice should be pending"),
                Err(err) => {
                    assert_eq!(err.code, ErrorCode::AlreadyClaimed);
                    assert_eq!(state.sessions().read().await.pending(&id), 1);
                }
            }
            state.disconnect_session(&id).await;
        }
    }

    #[tokio::test]
    async fn test_stats_follow_lifecycle() {
        let state = GatewayState::new(Config::default());
        let (a, _rx_a) = connect(&state).await;
        let (b, _rx_b) = connect(&state).await;
        state.create_surface(&a, "main", "cat1", false, None).await.unwrap();
        state.delete_surface(&a, "main").await.unwrap();
        state.disconnect_session(&b).await;
        assert!(!state.surfaces().write().await.delete("ghost"));

        let stats = state.stats();
        assert_eq!(stats.sessions_opened, 2);
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.surfaces_created, 1);
        assert_eq!(stats.surfaces_deleted, 1);
        assert_eq!(stats.surface_errors, 1);
    }

    #[tokio::test]
    async fn test_disconnect_notifies_other_sessions() {
        let state = GatewayState::new(Config::default());
        let (a, _rx_a) = connect(&state).await;
        let (b, mut rx_b) = connect(&state).await;
        state.create_surface(&b, "main", "cat1", false, None).await.unwrap();
        state.drain_session(&a).await.unwrap();

        assert!(state.disconnect_session(&b).await);
        assert!(!state.disconnect_session(&b).await);

        let drained = state.drain_session(&a).await.unwrap();
        assert_eq!(action_names(&drained), vec![SESSION_DISCONNECTED]);

        // surface survives in the store but is no longer routable
        assert!(state.get_surface("main").await.is_some());
        assert!(state.sessions().read().await.session_for_surface("main").is_none());

        // output closed
        frames(&mut rx_b);
        assert!(rx_b.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_push_removes_session() {
        let state = GatewayState::new(Config::default());
        let (id, rx) = connect(&state).await;
        drop(rx);

        assert!(state.create_surface(&id, "main", "cat1", false, None).await.is_ok());
        assert!(!state.sessions().read().await.contains(&id));
    }

    #[tokio::test]
    async fn test_enqueue_upstream_routing() {
        let state = GatewayState::new(Config::default());
        let (id, _rx) = connect(&state).await;
        state.create_surface(&id, "main", "cat1", false, None).await.unwrap();

        let click = UpstreamMessage::Action(UserAction {
            name: "click".into(),
            surface_id: "main".into(),
            source_component_id: "btn".into(),
            timestamp: id::timestamp(),
            context: Default::default(),
        });

        assert_eq!(state.enqueue_upstream(Some(&id), click.clone()).await.unwrap(), id);
        assert_eq!(state.enqueue_upstream(None, click.clone()).await.unwrap(), id);
        assert_eq!(
            state.enqueue_upstream(Some("stale"), click).await.unwrap(),
            id,
            "unknown header falls back to surface routing"
        );

        let orphan = UpstreamMessage::Action(UserAction::synthetic("x", Default::default()));
        let err = state.enqueue_upstream(None, orphan).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SurfaceNotFound);
    }

    #[tokio::test]
    async fn test_drain_for_agent_respects_claims() {
        let state = GatewayState::new(Config::default());
        let (a, _rx_a) = connect(&state).await;
        let (b, _rx_b) = connect(&state).await;
        let (c, _rx_c) = connect(&state).await;

        state.claim("agent-1", &a).await.unwrap();
        state.claim("agent-2", &b).await.unwrap();
        state.create_surface(&a, "form", "cat1", true, None).await.unwrap();
        state
            .update_data_model(&a, "form", Some("/name".into()), Some(json!("Ada")))
            .await
            .unwrap();

        let batches = state.drain_for_agent(Some("agent-1")).await;
        let ids: Vec<&str> = batches.iter().map(|b| b.session_id.as_str()).collect();
        let mut expected = vec![a.as_str(), c.as_str()];
        expected.sort();
        assert_eq!(ids, expected);

        let batch_a = batches.iter().find(|batch| batch.session_id == a).unwrap();
        assert_eq!(batch_a.data_models["form"], json!({"name": "Ada"}));

        assert!(state.drain_for_agent(Some("agent-1")).await.is_empty());
        let rest = state.drain_for_agent(Some("agent-2")).await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].session_id, b);
    }

    #[tokio::test]
    async fn test_max_connections() {
        let mut config = Config::default();
        config.gateway.max_connections = 1;
        let state = GatewayState::new(config);
        let (_id, _rx) = connect(&state).await;

        let (output, _rx2) = ChannelOutput::new();
        let err = state.create_session(Arc::new(output), None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Capacity(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_sessions() {
        let mut config = Config::default();
        config.session.idle_timeout_secs = 120;
        config.session.sweep_interval_secs = 60;
        let state = Arc::new(GatewayState::new(config));

        let (quiet, _rx_q) = connect(&state).await;
        let (busy, _rx_b) = connect(&state).await;
        let sweeper = state.spawn_sweeper();

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(45)).await;
            state.touch(&busy).await;
        }

        let sessions = state.sessions().read().await;
        assert!(!sessions.contains(&quiet));
        assert!(sessions.contains(&busy));
        assert_eq!(sessions.pending(&busy), 2, "connected + disconnected notice");
        drop(sessions);
        sweeper.abort();
    }
}
