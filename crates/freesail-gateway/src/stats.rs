//! Lifecycle counters fed by the registry and store event buses.

use crate::events::{
    Event, EventBus, SessionEvent, SessionEventKind, Subscription, SurfaceEvent, SurfaceEventKind,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Default)]
struct Counters {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    surfaces_created: AtomicU64,
    surfaces_deleted: AtomicU64,
    surface_errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub surfaces_created: u64,
    pub surfaces_deleted: u64,
    pub surface_errors: u64,
}

/// Subscribes to both buses for the lifetime of the gateway state.
pub struct GatewayStats {
    counters: Arc<Counters>,
    subscriptions: Vec<Subscription>,
}

impl GatewayStats {
    /// Start counting events from `sessions` and `surfaces`.
    pub fn attach(sessions: &EventBus<SessionEvent>, surfaces: &EventBus<SurfaceEvent>) -> Self {
        let counters = Arc::new(Counters::default());

        let mut subscriptions = vec![
            sessions.subscribe(
                SessionEventKind::Created,
                bump(&counters, |c| &c.sessions_opened),
            ),
            sessions.subscribe(
                SessionEventKind::Removed,
                bump(&counters, |c| &c.sessions_closed),
            ),
            surfaces.subscribe(
                SurfaceEventKind::Created,
                bump(&counters, |c| &c.surfaces_created),
            ),
            surfaces.subscribe(
                SurfaceEventKind::Deleted,
                bump(&counters, |c| &c.surfaces_deleted),
            ),
        ];

        let errors = Arc::clone(&counters);
        subscriptions.push(surfaces.subscribe(SurfaceEventKind::Error, move |event| {
            if let SurfaceEvent::Error {
                code,
                surface_id,
                message,
            } = event
            {
                warn!("Surface {} error {}: {}", surface_id, code, message);
            }
            errors.surface_errors.fetch_add(1, Ordering::Relaxed);
        }));

        Self {
            counters,
            subscriptions,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            sessions_opened: c.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: c.sessions_closed.load(Ordering::Relaxed),
            surfaces_created: c.surfaces_created.load(Ordering::Relaxed),
            surfaces_deleted: c.surfaces_deleted.load(Ordering::Relaxed),
            surface_errors: c.surface_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for GatewayStats {
    fn drop(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

fn bump<E: Event>(
    counters: &Arc<Counters>,
    pick: fn(&Counters) -> &AtomicU64,
) -> impl Fn(&E) + Send + Sync + 'static {
    let counters = Arc::clone(counters);
    move |_: &E| {
        pick(&counters).fetch_add(1, Ordering::Relaxed);
    }
}
