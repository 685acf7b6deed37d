//! Per-target lock registry.
//!
//! One async mutex per router name, created on first reference and kept for
//! the life of the process. Everything the dispatcher does for a target,
//! including mutation of its aggregation queue, happens while holding that
//! target's lock.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use vr_types::NetworkElementCommand;

/// Commands accepted between an aggregation Start and Finish.
#[derive(Debug, Default)]
pub struct AggregationSession {
    queue: Vec<NetworkElementCommand>,
}

impl AggregationSession {
    pub fn enqueue(&mut self, command: NetworkElementCommand) {
        self.queue.push(command);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn into_commands(self) -> Vec<NetworkElementCommand> {
        self.queue
    }

    /// Sum of expected answers across all queued commands.
    pub fn answers_count(&self) -> usize {
        self.queue.iter().map(|c| c.answers_count()).sum()
    }
}

/// State guarded by a target's lock.
#[derive(Debug, Default)]
pub struct TargetState {
    session: Option<AggregationSession>,
}

impl TargetState {
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Opens a session. Returns false if one is already open.
    pub fn open_session(&mut self) -> bool {
        if self.session.is_some() {
            return false;
        }
        self.session = Some(AggregationSession::default());
        true
    }

    pub fn session_mut(&mut self) -> Option<&mut AggregationSession> {
        self.session.as_mut()
    }

    /// Removes the session, leaving the target with none.
    pub fn take_session(&mut self) -> Option<AggregationSession> {
        self.session.take()
    }
}

/// Held lock on one target.
pub type TargetGuard = OwnedMutexGuard<TargetState>;

#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<String, Arc<Mutex<TargetState>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for `target`, inserting a fresh one if absent.
    pub fn resolve(&self, target: &str) -> Arc<Mutex<TargetState>> {
        if let Some(lock) = self.locks.get(target) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.locks
                .entry(target.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TargetState::default())))
                .value(),
        )
    }

    /// Waits for the target's lock without a timeout.
    ///
    /// Waiters are woken in arrival order.
    pub async fn acquire(&self, target: &str) -> TargetGuard {
        self.resolve(target).lock_owned().await
    }

    /// Number of targets ever referenced.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
