//! Per-session action queues and exclusive agent claims.

use freesail_core::protocol::{ErrorCode, OperationError, UpstreamMessage};
use std::collections::{BTreeSet, HashMap};

/// FIFO queue of upstream messages per session.
///
/// Queues are unbounded; agents are expected to drain regularly.
#[derive(Debug, Default)]
pub struct ActionMailbox {
    queues: HashMap<String, Vec<UpstreamMessage>>,
}

impl ActionMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue for a session if it has none.
    pub fn open(&mut self, session_id: &str) {
        self.queues.entry(session_id.to_string()).or_default();
    }

    /// Append a message. Returns `false` if the session has no queue.
    pub fn enqueue(&mut self, session_id: &str, message: UpstreamMessage) -> bool {
        match self.queues.get_mut(session_id) {
            Some(queue) => {
                queue.push(message);
                true
            }
            None => false,
        }
    }

    /// Take every queued message, leaving an empty queue in place.
    pub fn dequeue_all(&mut self, session_id: &str) -> Vec<UpstreamMessage> {
        self.queues
            .get_mut(session_id)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Number of messages waiting for a session.
    pub fn pending(&self, session_id: &str) -> usize {
        self.queues.get(session_id).map_or(0, Vec::len)
    }

    /// Drop a session's queue and any undelivered messages.
    pub fn close(&mut self, session_id: &str) -> usize {
        self.queues.remove(session_id).map_or(0, |q| q.len())
    }
}

/// Exclusive binding of agents to sessions.
#[derive(Debug, Default)]
pub struct AgentBindings {
    by_agent: HashMap<String, BTreeSet<String>>,
    by_session: HashMap<String, String>,
}

impl AgentBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a session for an agent.
    ///
    /// Re-claiming by the holder succeeds; claiming a session held by a
    /// different agent fails with `ALREADY_CLAIMED`.
    pub fn claim(&mut self, agent_id: &str, session_id: &str) -> Result<(), OperationError> {
        if let Some(holder) = self.by_session.get(session_id) {
            if holder != agent_id {
                return Err(OperationError::new(
                    ErrorCode::AlreadyClaimed,
                    format!(
                        "Session '{}' is already claimed by agent '{}'",
                        session_id, holder
                    ),
                ));
            }
            return Ok(());
        }

        self.by_session
            .insert(session_id.to_string(), agent_id.to_string());
        self.by_agent
            .entry(agent_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        Ok(())
    }

    /// Release a claim held by `agent_id`. Returns whether anything was released.
    pub fn release(&mut self, agent_id: &str, session_id: &str) -> bool {
        if self.by_session.get(session_id).map(String::as_str) != Some(agent_id) {
            return false;
        }
        self.by_session.remove(session_id);
        self.forget(agent_id, session_id);
        true
    }

    /// Drop whatever claim exists on a session, returning the former holder.
    pub fn release_session(&mut self, session_id: &str) -> Option<String> {
        let agent_id = self.by_session.remove(session_id)?;
        self.forget(&agent_id, session_id);
        Some(agent_id)
    }

    /// Agent currently holding a session.
    pub fn holder(&self, session_id: &str) -> Option<&str> {
        self.by_session.get(session_id).map(String::as_str)
    }

    /// Sessions claimed by an agent.
    pub fn sessions_of(&self, agent_id: &str) -> Vec<String> {
        self.by_agent
            .get(agent_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of agents with at least one claim.
    pub fn agent_count(&self) -> usize {
        self.by_agent.len()
    }

    fn forget(&mut self, agent_id: &str, session_id: &str) {
        if let Some(sessions) = self.by_agent.get_mut(agent_id) {
            sessions.remove(session_id);
            if sessions.is_empty() {
                self.by_agent.remove(agent_id);
            }
        }
    }
}
