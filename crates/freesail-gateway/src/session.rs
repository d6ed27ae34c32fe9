//! Session Registry: client sessions, surface ownership, and catalog scoping.

use crate::error::GatewayError;
use crate::events::{EventBus, SessionEvent};
use crate::mailbox::{ActionMailbox, AgentBindings};
use crate::output::OutputChannel;
use crate::Result;
use chrono::{DateTime, Utc};
use freesail_core::catalog::Catalog;
use freesail_core::protocol::{
    OperationError, UpstreamMessage, UserAction, SESSION_CONNECTED,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One connected client.
pub struct Session {
    /// Session ID.
    pub id: String,

    /// Surfaces created on this session.
    pub surfaces: BTreeSet<String>,

    /// Catalogs the client registered.
    pub catalogs: BTreeSet<String>,

    /// Catalog ids the client declared support for on connect.
    pub capabilities: Option<Vec<String>>,

    /// Connection time.
    pub connected_at: DateTime<Utc>,

    /// Last time the client was heard from.
    pub last_activity: Instant,

    output: Arc<dyn OutputChannel>,
}

impl Session {
    fn new(id: &str, output: Arc<dyn OutputChannel>, capabilities: Option<Vec<String>>) -> Self {
        Self {
            id: id.to_string(),
            surfaces: BTreeSet::new(),
            catalogs: BTreeSet::new(),
            capabilities,
            connected_at: Utc::now(),
            last_activity: Instant::now(),
            output,
        }
    }

    /// Push one frame to the client.
    pub fn send(&self, frame: &str) -> Result<()> {
        self.output.send(frame)
    }

    /// Record client activity.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the client was last heard from.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    fn declares(&self, catalog_id: &str) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|caps| caps.iter().any(|c| c == catalog_id))
    }

    fn has_declared_nothing(&self) -> bool {
        self.catalogs.is_empty() && self.capabilities.as_ref().map_or(true, Vec::is_empty)
    }
}

/// Registry of sessions and the indices routing surfaces to them.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    surface_sessions: HashMap<String, String>,
    surface_catalogs: HashMap<String, String>,
    catalogs: BTreeMap<String, Catalog>,
    mailbox: ActionMailbox,
    bindings: AgentBindings,
    events: EventBus<SessionEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event bus for registry changes.
    pub fn events(&self) -> &EventBus<SessionEvent> {
        &self.events
    }

    /// Register a session and seed its mailbox with `__session_connected`.
    ///
    /// Returns `false` if the id is already in use.
    pub fn create_session(
        &mut self,
        session_id: &str,
        output: Arc<dyn OutputChannel>,
        capabilities: Option<Vec<String>>,
    ) -> bool {
        if self.sessions.contains_key(session_id) {
            warn!("Session id collision: {}", session_id);
            return false;
        }

        let mut context = Self::session_context(session_id);
        if let Some(caps) = &capabilities {
            context.insert("capabilities".to_string(), json!(caps));
        }

        self.sessions.insert(
            session_id.to_string(),
            Session::new(session_id, output, capabilities),
        );
        self.mailbox.open(session_id);
        self.mailbox.enqueue(
            session_id,
            UpstreamMessage::Action(UserAction::synthetic(SESSION_CONNECTED, context)),
        );

        info!("Session created: {}", session_id);
        self.events.emit(&SessionEvent::Created {
            session_id: session_id.to_string(),
        });
        true
    }

    /// Remove a session.
    ///
    /// Routing indices for its surfaces are cleared but the surfaces
    /// themselves are left to the Surface Store. Any agent claim is released
    /// and the output channel is closed.
    pub fn remove_session(&mut self, session_id: &str) -> bool {
        let Some(session) = self.sessions.remove(session_id) else {
            return false;
        };

        for surface_id in &session.surfaces {
            self.surface_sessions.remove(surface_id);
            self.surface_catalogs.remove(surface_id);
        }
        if let Some(agent_id) = self.bindings.release_session(session_id) {
            debug!("Released claim of {} on removed session {}", agent_id, session_id);
        }
        let dropped = self.mailbox.close(session_id);
        session.output.close();

        info!(
            "Session removed: {} ({} surfaces, {} undelivered actions)",
            session_id,
            session.surfaces.len(),
            dropped
        );
        self.events.emit(&SessionEvent::Removed {
            session_id: session_id.to_string(),
        });
        true
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Ids of every session, sorted.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Refresh a session's activity time.
    pub fn touch(&mut self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Push a frame to a session's output channel.
    pub fn send(&self, session_id: &str, frame: &str) -> Result<()> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| GatewayError::NotFound(format!("Session '{}'", session_id)))?
            .send(frame)
    }

    /// Store catalogs globally and record them as registered by a session.
    pub fn register_catalogs(
        &mut self,
        session_id: &str,
        catalogs: Vec<Catalog>,
    ) -> std::result::Result<Vec<String>, OperationError> {
        if !self.sessions.contains_key(session_id) {
            return Err(OperationError::session_not_found(session_id));
        }

        let ids: Vec<String> = catalogs.iter().map(|c| c.id.clone()).collect();
        for catalog in catalogs {
            self.insert_catalog(catalog);
        }
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.catalogs.extend(ids.iter().cloned());
        }

        info!("Session {} registered catalogs: {:?}", session_id, ids);
        self.events.emit(&SessionEvent::CatalogsRegistered {
            session_id: session_id.to_string(),
            catalog_ids: ids.clone(),
        });
        Ok(ids)
    }

    /// Store a catalog globally. An existing catalog with the same id is
    /// replaced.
    pub fn insert_catalog(&mut self, catalog: Catalog) -> Option<Catalog> {
        let previous = self.catalogs.insert(catalog.id.clone(), catalog);
        if let Some(old) = &previous {
            if self.catalogs.get(&old.id) != Some(old) {
                warn!("Catalog '{}' replaced with a different definition", old.id);
            }
        }
        previous
    }

    pub fn catalog(&self, catalog_id: &str) -> Option<&Catalog> {
        self.catalogs.get(catalog_id)
    }

    /// Every known catalog, by id.
    pub fn catalogs(&self) -> impl Iterator<Item = &Catalog> {
        self.catalogs.values()
    }

    /// Check whether a session may use a catalog. Returns the reason if not.
    ///
    /// A session that has neither declared capabilities nor registered
    /// catalogs may use any catalog.
    pub fn validate_catalog_for_session(&self, session_id: &str, catalog_id: &str) -> Option<String> {
        let Some(session) = self.sessions.get(session_id) else {
            return Some(format!("Session '{}' not found", session_id));
        };
        if session.has_declared_nothing()
            || session.catalogs.contains(catalog_id)
            || session.declares(catalog_id)
        {
            return None;
        }
        Some(format!(
            "Catalog '{}' is not registered or supported by session '{}'",
            catalog_id, session_id
        ))
    }

    /// Record that a surface belongs to a session.
    ///
    /// Returns `false` for an unknown session, or when another session
    /// already owns the surface. Only removal or deletion frees a surface.
    pub fn bind_surface(&mut self, session_id: &str, surface_id: &str, catalog_id: &str) -> bool {
        if let Some(owner) = self.surface_sessions.get(surface_id) {
            if owner != session_id {
                debug!(
                    "Refusing to bind surface {} to {}: owned by {}",
                    surface_id, session_id, owner
                );
                return false;
            }
        }
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        session.surfaces.insert(surface_id.to_string());
        self.surface_sessions
            .insert(surface_id.to_string(), session_id.to_string());
        self.surface_catalogs
            .insert(surface_id.to_string(), catalog_id.to_string());
        true
    }

    /// Forget a surface's routing. Returns the former owner.
    pub fn unbind_surface(&mut self, surface_id: &str) -> Option<String> {
        self.surface_catalogs.remove(surface_id);
        let session_id = self.surface_sessions.remove(surface_id)?;
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.surfaces.remove(surface_id);
        }
        Some(session_id)
    }

    /// Session that owns a surface.
    pub fn session_for_surface(&self, surface_id: &str) -> Option<&str> {
        self.surface_sessions.get(surface_id).map(String::as_str)
    }

    /// Catalog a surface is bound to.
    pub fn catalog_for_surface(&self, surface_id: &str) -> Option<&str> {
        self.surface_catalogs.get(surface_id).map(String::as_str)
    }

    /// Queue an upstream message for a session.
    pub fn enqueue_action(&mut self, session_id: &str, message: UpstreamMessage) -> bool {
        if !self.sessions.contains_key(session_id) {
            return false;
        }
        self.mailbox.enqueue(session_id, message)
    }

    /// Queue an upstream message on the session owning its surface.
    ///
    /// Returns the session id, or `None` if the surface is unroutable.
    pub fn enqueue_action_by_surface(&mut self, message: UpstreamMessage) -> Option<String> {
        let session_id = self.session_for_surface(message.surface_id())?.to_string();
        if self.enqueue_action(&session_id, message) {
            Some(session_id)
        } else {
            None
        }
    }

    /// Queue a copy of `message` on every session except `except`.
    pub fn broadcast_action(&mut self, except: &str, message: &UpstreamMessage) -> usize {
        let targets: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| id.as_str() != except)
            .cloned()
            .collect();
        targets
            .iter()
            .filter(|id| self.mailbox.enqueue(id, message.clone()))
            .count()
    }

    /// Drain a session's mailbox.
    pub fn dequeue_all(&mut self, session_id: &str) -> Vec<UpstreamMessage> {
        self.mailbox.dequeue_all(session_id)
    }

    /// Messages waiting in a session's mailbox.
    pub fn pending(&self, session_id: &str) -> usize {
        self.mailbox.pending(session_id)
    }

    /// Claim a session for an agent.
    pub fn claim(&mut self, agent_id: &str, session_id: &str) -> std::result::Result<(), OperationError> {
        if !self.sessions.contains_key(session_id) {
            return Err(OperationError::session_not_found(session_id));
        }
        self.bindings.claim(agent_id, session_id)?;
        debug!("Agent {} claimed session {}", agent_id, session_id);
        self.events.emit(&SessionEvent::Claimed {
            agent_id: agent_id.to_string(),
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    /// Release an agent's claim on a session.
    pub fn release(&mut self, agent_id: &str, session_id: &str) -> bool {
        if !self.bindings.release(agent_id, session_id) {
            return false;
        }
        debug!("Agent {} released session {}", agent_id, session_id);
        self.events.emit(&SessionEvent::Released {
            agent_id: agent_id.to_string(),
            session_id: session_id.to_string(),
        });
        true
    }

    /// Agent currently holding a session.
    pub fn holder(&self, session_id: &str) -> Option<&str> {
        self.bindings.holder(session_id)
    }

    /// Sessions idle for longer than `timeout`.
    pub fn stale_sessions(&self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.idle_for(now) > timeout)
            .map(|s| s.id.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Context payload describing a session, used by synthetic actions.
    pub fn session_context(session_id: &str) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert("sessionId".to_string(), json!(session_id));
        context
    }
}
