//! Engine wiring: catalog, registry, aggregator and orchestrator built from settings

use crate::chain::{ChainCatalog, RouteResolver};
use crate::config::Settings;
use crate::events::{EngineEvent, EventBus};
use crate::provider::{build_registry, ProviderRegistry};
use crate::quote::QuoteAggregator;
use crate::tx::TransactionOrchestrator;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The quote engine and transaction orchestrator sharing one catalog,
/// registry and event bus
pub struct BridgeEngine {
    pub catalog: Arc<ChainCatalog>,
    pub resolver: RouteResolver,
    pub registry: Arc<ProviderRegistry>,
    pub aggregator: QuoteAggregator,
    pub orchestrator: TransactionOrchestrator,
    events: EventBus,
}

impl BridgeEngine {
    /// Build the engine with every available integration registered
    pub fn from_settings(settings: &Settings) -> Self {
        let catalog = ChainCatalog::from_settings(settings);
        let registry = build_registry(&catalog);
        Self::with_registry(settings, catalog, registry)
    }

    /// Build the engine around an explicit registry
    pub fn with_registry(
        settings: &Settings,
        catalog: Arc<ChainCatalog>,
        registry: ProviderRegistry,
    ) -> Self {
        let events = EventBus::default();
        let registry = Arc::new(registry);
        let resolver = RouteResolver::new(catalog.clone());

        let aggregator = QuoteAggregator::new(
            resolver.clone(),
            registry.clone(),
            settings.engine.clone(),
            events.clone(),
        );
        let orchestrator =
            TransactionOrchestrator::new(registry.clone(), &settings.orchestrator, events.clone());

        info!(
            "Bridge engine ready: {} chains, {} adapters",
            catalog.chains().len(),
            registry.len()
        );

        Self {
            catalog,
            resolver,
            registry,
            aggregator,
            orchestrator,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop timers and invalidate every tracked transaction
    pub async fn shutdown(&self) {
        self.aggregator.shutdown().await;
        self.orchestrator.invalidate_all();
    }
}
