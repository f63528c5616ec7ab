//! Per-transaction handle and its state machine
//!
//! State lives in a `tokio::sync::watch` channel. Every write carries the
//! generation it was started under; once the handle is invalidated the
//! generation moves on and late writes are dropped.

use super::TransactionStatus;
use crate::chain::ProviderId;
use crate::error::BridgeError;
use crate::events::{EngineEvent, EventBus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Execution state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Idle,
    Signing,
    Submitted,
    Pending,
    Confirmed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Confirmed | ExecutionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Signing => "signing",
            ExecutionState::Submitted => "submitted",
            ExecutionState::Pending => "pending",
            ExecutionState::Confirmed => "confirmed",
            ExecutionState::Failed => "failed",
        }
    }
}

/// Point-in-time view of a handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandleSnapshot {
    pub id: Uuid,
    pub provider: Option<ProviderId>,
    pub state: ExecutionState,
    pub hash: Option<String>,
    pub status: Option<TransactionStatus>,
    pub error: Option<BridgeError>,
    pub invalidated: bool,
    pub updated_at: DateTime<Utc>,
}

impl HandleSnapshot {
    /// Nothing further will change: terminal, errored or invalidated
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() || self.error.is_some() || self.invalidated
    }
}

struct HandleInner {
    id: Uuid,
    generation: AtomicU64,
    state: watch::Sender<HandleSnapshot>,
    events: EventBus,
}

/// Handle to one execution, shared by the caller and the orchestrator
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

impl TransactionHandle {
    pub(crate) fn new(provider: Option<ProviderId>, events: EventBus) -> Self {
        let id = Uuid::new_v4();
        let (state, _) = watch::channel(HandleSnapshot {
            id,
            provider,
            state: ExecutionState::Idle,
            hash: None,
            status: None,
            error: None,
            invalidated: false,
            updated_at: Utc::now(),
        });

        Self {
            inner: Arc::new(HandleInner {
                id,
                generation: AtomicU64::new(0),
                state,
                events,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn snapshot(&self) -> HandleSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn state(&self) -> ExecutionState {
        self.inner.state.borrow().state
    }

    pub fn hash(&self) -> Option<String> {
        self.inner.state.borrow().hash.clone()
    }

    pub fn error(&self) -> Option<BridgeError> {
        self.inner.state.borrow().error.clone()
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.state.borrow().invalidated
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<HandleSnapshot> {
        self.inner.state.subscribe()
    }

    /// Stop tracking. Later updates are dropped and the state stays where it is.
    pub fn invalidate(&self) {
        let generation = &self.inner.generation;
        let changed = self.inner.state.send_if_modified(|snapshot| {
            if snapshot.invalidated {
                return false;
            }
            generation.fetch_add(1, Ordering::SeqCst);
            snapshot.invalidated = true;
            snapshot.updated_at = Utc::now();
            true
        });

        if changed {
            debug!("Transaction handle {} invalidated", self.inner.id);
            self.publish();
        }
    }

    /// Wait until the handle is terminal, errored or invalidated
    pub async fn settled(&self) -> HandleSnapshot {
        let mut rx = self.inner.state.subscribe();
        let settled = rx
            .wait_for(HandleSnapshot::is_settled)
            .await
            .map(|snapshot| snapshot.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Apply `update` if the handle is still on `generation`.
    ///
    /// Returns false when the write was dropped.
    pub(crate) fn transition(
        &self,
        generation: u64,
        update: impl FnOnce(&mut HandleSnapshot),
    ) -> bool {
        let current = &self.inner.generation;
        let applied = self.inner.state.send_if_modified(|snapshot| {
            if snapshot.invalidated || current.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(snapshot);
            snapshot.updated_at = Utc::now();
            true
        });

        if applied {
            self.publish();
        } else {
            debug!(
                "Dropped update for transaction handle {} (generation {})",
                self.inner.id, generation
            );
        }
        applied
    }

    fn publish(&self) {
        self.inner.events.publish(EngineEvent::TransactionUpdated {
            snapshot: self.snapshot(),
        });
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("TransactionHandle")
            .field("id", &snapshot.id)
            .field("state", &snapshot.state)
            .field("hash", &snapshot.hash)
            .field("invalidated", &snapshot.invalidated)
            .finish()
    }
}
