use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::cancel::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestStatus {
    pub state: RequestState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration: Option<chrono::Duration>,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl RequestStatus {
    fn end(&mut self, state: RequestState, error: Option<String>) {
        let now = Utc::now();
        self.state = state;
        self.ended_at = Some(now);
        self.duration = Some(now - self.started_at);
        self.error = error;
        self.cancelled = state == RequestState::Cancelled;
    }
}

#[derive(Default)]
struct Registry {
    active: HashMap<String, CancellationToken>,
    states: BTreeMap<String, RequestStatus>,
}

/// Lifecycle of one in-flight request per target.
///
/// States are kept after a request ends and only go away with [`clear_history`].
///
/// [`clear_history`]: RequestTracker::clear_history
#[derive(Default)]
pub struct RequestTracker {
    registry: Mutex<Registry>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking `target`. Returns `None` if it already has a request in flight.
    pub fn register(&self, target: &str) -> Option<CancellationToken> {
        let mut registry = self.registry();
        if registry.active.contains_key(target) {
            debug!("{} already has an active request", target);
            return None;
        }
        let token = CancellationToken::new();
        registry.active.insert(target.to_string(), token.clone());
        registry.states.insert(
            target.to_string(),
            RequestStatus {
                state: RequestState::Pending,
                started_at: Utc::now(),
                ended_at: None,
                duration: None,
                error: None,
                cancelled: false,
            },
        );
        Some(token)
    }

    /// Settles a pending request. Anything not pending is left untouched.
    pub fn complete(&self, target: &str, success: bool, error: Option<String>) {
        let mut registry = self.registry();
        let Some(status) = registry
            .states
            .get_mut(target)
            .filter(|s| s.state == RequestState::Pending)
        else {
            return;
        };
        let state = if success {
            RequestState::Completed
        } else {
            RequestState::Failed
        };
        status.end(state, error);
        registry.active.remove(target);
    }

    pub fn cancel(&self, target: &str) {
        let mut registry = self.registry();
        let Some(token) = registry.active.remove(target) else {
            return;
        };
        token.cancel();
        if let Some(status) = registry.states.get_mut(target) {
            status.end(RequestState::Cancelled, None);
        }
        info!("Cancelled request for {}", target);
    }

    pub fn cancel_all(&self) {
        let mut registry = self.registry();
        let registry = &mut *registry;
        let cancelled = registry.active.len();
        for (_, token) in registry.active.drain() {
            token.cancel();
        }
        for status in registry.states.values_mut() {
            if status.state == RequestState::Pending {
                status.end(RequestState::Cancelled, None);
            }
        }
        info!("Cancelled {} active requests", cancelled);
    }

    pub fn status(&self, target: &str) -> Option<RequestStatus> {
        self.registry().states.get(target).cloned()
    }

    pub fn active_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.registry().active.keys().cloned().collect();
        targets.sort();
        targets
    }

    pub fn has_active_requests(&self) -> bool {
        !self.registry().active.is_empty()
    }

    /// Forgets finished states. Active requests keep running and stay tracked.
    pub fn clear_history(&self) {
        let mut registry = self.registry();
        let registry = &mut *registry;
        let active = &registry.active;
        registry.states.retain(|target, _| active.contains_key(target));
    }

    pub fn snapshot(&self) -> BTreeMap<String, RequestStatus> {
        self.registry().states.clone()
    }
}
