//! Engine event types and the event bus
//!
//! Defines events emitted by the quote aggregator and the transaction
//! orchestrator. Subscribers (a UI notifier, the CLI) receive them over a
//! `tokio::sync::broadcast` channel.

use crate::chain::{ProviderId, Route};
use crate::quote::{Quote, QuoteSnapshot};
use crate::tx::HandleSnapshot;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Events emitted by the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A quote round started (after validation, before debounce)
    QuotesRequested {
        request_id: u64,
        route: Route,
        providers: Vec<ProviderId>,
    },

    /// A provider's quote landed
    QuoteReceived {
        request_id: u64,
        quote: Quote,
        snapshot: Arc<QuoteSnapshot>,
    },

    /// An expiring quote was replaced
    QuoteRefreshed {
        request_id: u64,
        quote: Quote,
        snapshot: Arc<QuoteSnapshot>,
    },

    /// The live quote set was invalidated
    QuotesCleared { request_id: u64 },

    /// A transaction handle changed state
    TransactionUpdated { snapshot: HandleSnapshot },
}

impl EngineEvent {
    /// Get event name for metrics and logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::QuotesRequested { .. } => "quotes_requested",
            EngineEvent::QuoteReceived { .. } => "quote_received",
            EngineEvent::QuoteRefreshed { .. } => "quote_refreshed",
            EngineEvent::QuotesCleared { .. } => "quotes_cleared",
            EngineEvent::TransactionUpdated { .. } => "transaction_updated",
        }
    }

    /// Request token for quote events
    pub fn request_id(&self) -> Option<u64> {
        match self {
            EngineEvent::QuotesRequested { request_id, .. }
            | EngineEvent::QuoteReceived { request_id, .. }
            | EngineEvent::QuoteRefreshed { request_id, .. }
            | EngineEvent::QuotesCleared { request_id } => Some(*request_id),
            EngineEvent::TransactionUpdated { .. } => None,
        }
    }
}

/// Cloneable publisher shared by the aggregator and the orchestrator
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: EngineEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => trace!("Published {} to {} subscriber(s)", name, receivers),
            Err(_) => trace!("Dropped {} (no subscribers)", name),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
