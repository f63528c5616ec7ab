//! Quote aggregation across bridge providers
//!
//! A request is debounced, then fanned out to every eligible provider as
//! independent tasks. Each landed quote produces a new ranked snapshot that
//! is pushed to the request's stream. Every request carries a monotonically
//! increasing token; results for any other token are dropped.

use super::{Quote, QuoteSnapshot, QuoteStream, QuoteUpdate, SortOrder, UpdateKind};
use crate::chain::{ProviderId, Route, RouteResolver};
use crate::config::EngineConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{EngineEvent, EventBus};
use crate::metrics;
use crate::provider::ProviderRegistry;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Live state of the current request
struct RequestState {
    request_id: u64,
    route: Option<Route>,
    snapshot: Arc<QuoteSnapshot>,
    subscriber: Option<mpsc::UnboundedSender<QuoteUpdate>>,
    sort: SortOrder,
    /// Providers with a refresh in flight
    refreshing: HashSet<ProviderId>,
}

impl RequestState {
    fn idle(sort: SortOrder) -> Self {
        Self {
            request_id: 0,
            route: None,
            snapshot: Arc::new(QuoteSnapshot::empty(0, sort)),
            subscriber: None,
            sort,
            refreshing: HashSet::new(),
        }
    }
}

struct Shared {
    resolver: RouteResolver,
    registry: Arc<ProviderRegistry>,
    config: EngineConfig,
    events: EventBus,
    /// Latest request token
    latest: AtomicU64,
    state: RwLock<RequestState>,
    /// Debounce and refresh timers of the current request
    timers: Mutex<Vec<JoinHandle<()>>>,
}

/// Fans quote requests out to providers and keeps the ranked result set
pub struct QuoteAggregator {
    shared: Arc<Shared>,
}

impl QuoteAggregator {
    pub fn new(
        resolver: RouteResolver,
        registry: Arc<ProviderRegistry>,
        config: EngineConfig,
        events: EventBus,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                resolver,
                registry,
                config,
                events,
                latest: AtomicU64::new(0),
                state: RwLock::new(RequestState::idle(SortOrder::default())),
                timers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Start a quote round for a route.
    ///
    /// Fails immediately, without calling any provider, when the route is
    /// invalid or no provider serves it. Any previous request is superseded
    /// either way.
    pub async fn fetch_quotes(&self, route: Route) -> BridgeResult<QuoteStream> {
        self.start(route, true).await
    }

    /// Re-run the last route right away, skipping the debounce window
    pub async fn refresh_quotes(&self) -> BridgeResult<QuoteStream> {
        let route = self.shared.state.read().await.route.clone();
        match route {
            Some(route) => self.start(route, false).await,
            None => Err(BridgeError::validation_error(
                "route",
                "no quote request to refresh",
            )),
        }
    }

    async fn start(&self, route: Route, debounce: bool) -> BridgeResult<QuoteStream> {
        let shared = &self.shared;

        let providers = match shared.resolver.validate(&route) {
            Ok(()) => shared.resolver.providers_for_route(&route),
            Err(e) => {
                shared.invalidate(false).await;
                return Err(e);
            }
        };
        if providers.is_empty() {
            shared.invalidate(false).await;
            return Err(BridgeError::unsupported_route(
                &route.source_chain,
                &route.destination_chain,
            ));
        }

        metrics::record_quote_request(&route.source_chain, &route.destination_chain);

        let (tx, rx) = mpsc::unbounded_channel();
        let request_id = shared.begin(route.clone(), &providers, tx).await;

        info!(
            "Quote request {}: {} {} -> {} {} via {} provider(s)",
            request_id,
            route.source_chain,
            route.source_token,
            route.destination_chain,
            route.destination_token,
            providers.len()
        );
        shared.events.publish(EngineEvent::QuotesRequested {
            request_id,
            route: route.clone(),
            providers: providers.clone(),
        });

        let delay = if debounce {
            shared.config.debounce()
        } else {
            std::time::Duration::ZERO
        };
        let task = tokio::spawn({
            let shared = shared.clone();
            async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                if !shared.is_current(request_id) {
                    debug!("Quote request {} superseded during debounce", request_id);
                    return;
                }

                let slots = providers.into_iter().enumerate().collect();
                Shared::dispatch(&shared, request_id, &route, slots, UpdateKind::Initial);

                if shared.config.auto_refresh {
                    let refresher = tokio::spawn(Shared::refresh_loop(
                        shared.clone(),
                        request_id,
                        route,
                    ));
                    shared.track(refresher);
                }
            }
        });
        shared.track(task);

        Ok(QuoteStream::new(request_id, rx))
    }

    /// Invalidate and empty the live quote set
    pub async fn clear(&self) {
        self.shared.invalidate(true).await;
    }

    /// Invalidate the current request, keeping its last snapshot for display
    pub async fn invalidate(&self) {
        self.shared.invalidate(false).await;
    }

    /// Stop all timers and close the current stream
    pub async fn shutdown(&self) {
        self.shared.invalidate(false).await;
        info!("Quote aggregator shut down");
    }

    /// Re-rank the live snapshot under a new order
    pub async fn set_sort_order(&self, sort: SortOrder) -> Arc<QuoteSnapshot> {
        let mut state = self.shared.state.write().await;
        state.sort = sort;
        state.snapshot = Arc::new(state.snapshot.resorted(sort));
        state.snapshot.clone()
    }

    pub async fn snapshot(&self) -> Arc<QuoteSnapshot> {
        self.shared.state.read().await.snapshot.clone()
    }

    pub async fn quote_for_provider(&self, provider: &ProviderId) -> Option<Quote> {
        self.shared
            .state
            .read()
            .await
            .snapshot
            .quote_for_provider(provider)
            .cloned()
    }

    /// Token of the latest request
    pub fn current_request_id(&self) -> u64 {
        self.shared.latest.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for QuoteAggregator {
    fn drop(&mut self) {
        self.shared.latest.fetch_add(1, Ordering::SeqCst);
        self.shared.abort_timers();
    }
}

impl Shared {
    fn is_current(&self, request_id: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == request_id
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.timers.lock() {
            Ok(mut timers) => {
                timers.retain(|t| !t.is_finished());
                timers.push(handle);
            }
            Err(_) => handle.abort(),
        }
    }

    fn abort_timers(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            for timer in timers.drain(..) {
                timer.abort();
            }
        }
    }

    /// Install a new request: bump the token, reset the snapshot to loading
    /// placeholders and replace the subscriber
    async fn begin(
        &self,
        route: Route,
        providers: &[ProviderId],
        subscriber: mpsc::UnboundedSender<QuoteUpdate>,
    ) -> u64 {
        let mut state = self.state.write().await;
        let request_id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.abort_timers();

        let sort = state.sort;
        *state = RequestState {
            request_id,
            snapshot: Arc::new(QuoteSnapshot::loading(
                request_id,
                route.clone(),
                sort,
                providers,
            )),
            route: Some(route),
            subscriber: Some(subscriber),
            sort,
            refreshing: HashSet::new(),
        };
        request_id
    }

    async fn invalidate(&self, clear: bool) {
        let mut state = self.state.write().await;
        let request_id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.abort_timers();

        state.request_id = request_id;
        state.subscriber = None;
        state.refreshing.clear();
        if clear {
            state.route = None;
            state.snapshot = Arc::new(QuoteSnapshot::empty(request_id, state.sort));
        }
        drop(state);

        debug!("Quote requests invalidated (token {})", request_id);
        self.events.publish(EngineEvent::QuotesCleared { request_id });
    }

    /// Query each `(slot, provider)` as an independent task
    fn dispatch(
        shared: &Arc<Self>,
        request_id: u64,
        route: &Route,
        slots: Vec<(usize, ProviderId)>,
        kind: UpdateKind,
    ) {
        for (slot, provider) in slots {
            let shared = shared.clone();
            let route = route.clone();
            tokio::spawn(async move {
                let quote = shared.query(&provider, route).await;
                shared.apply(request_id, slot, quote, kind).await;
            });
        }
    }

    /// Ask one provider for a quote. Always yields a finalized quote.
    async fn query(&self, provider: &ProviderId, route: Route) -> Quote {
        let started = Instant::now();

        let Some(adapter) = self.registry.get(provider) else {
            warn!("No adapter registered for provider {}", provider);
            metrics::record_provider_quote(provider, "unavailable", 0.0);
            return Quote::failed(
                provider.clone(),
                BridgeError::provider_error(provider, "integration not implemented")
                    .with_retryable(false),
            )
            .finalize(self.config.quote_validity());
        };

        let call = tokio::spawn(async move { adapter.get_quote(&route).await });
        let (mut quote, outcome) = match timeout(self.config.provider_timeout(), call).await {
            Ok(Ok(quote)) => {
                let outcome = if quote.error.is_some() { "error" } else { "success" };
                (quote, outcome)
            }
            Ok(Err(e)) => {
                warn!("Quote task for {} aborted: {}", provider, e);
                (
                    Quote::failed(
                        provider.clone(),
                        BridgeError::provider_error(provider, "quote task aborted"),
                    ),
                    "error",
                )
            }
            Err(_) => {
                warn!(
                    "Provider {} did not quote within {}ms",
                    provider, self.config.provider_timeout_ms
                );
                (
                    Quote::failed(
                        provider.clone(),
                        BridgeError::network_error(
                            format!(
                                "{} quote timed out after {}ms",
                                provider, self.config.provider_timeout_ms
                            ),
                            Some(provider),
                        ),
                    ),
                    "timeout",
                )
            }
        };

        let elapsed = started.elapsed();
        metrics::record_provider_quote(provider, outcome, elapsed.as_secs_f64());
        debug!("Provider {} answered in {:?} ({})", provider, elapsed, outcome);

        if &quote.provider != provider {
            warn!(
                "Adapter for {} returned a quote for {}",
                provider, quote.provider
            );
            quote.provider = provider.clone();
        }
        quote.is_loading = false;
        quote.finalize(self.config.quote_validity())
    }

    /// Fold a landed quote into the live snapshot, dropping stale results
    async fn apply(&self, request_id: u64, slot: usize, quote: Quote, kind: UpdateKind) {
        let mut state = self.state.write().await;
        if state.request_id != request_id || !self.is_current(request_id) {
            metrics::record_stale_discard();
            debug!(
                "Discarding stale quote from {} (request {}, current {})",
                quote.provider,
                request_id,
                self.latest.load(Ordering::SeqCst)
            );
            return;
        }

        if kind == UpdateKind::Refresh {
            state.refreshing.remove(&quote.provider);
        }

        let snapshot = Arc::new(state.snapshot.with_quote(slot, quote.clone()));
        state.snapshot = snapshot.clone();

        let update = QuoteUpdate {
            request_id,
            quote: quote.clone(),
            snapshot: snapshot.clone(),
            kind,
        };
        let delivered = state
            .subscriber
            .as_ref()
            .map(|tx| tx.send(update).is_ok())
            .unwrap_or(false);
        if !delivered {
            state.subscriber = None;
        }
        drop(state);

        let event = match kind {
            UpdateKind::Initial => EngineEvent::QuoteReceived {
                request_id,
                quote,
                snapshot,
            },
            UpdateKind::Refresh => EngineEvent::QuoteRefreshed {
                request_id,
                quote,
                snapshot,
            },
        };
        self.events.publish(event);
    }

    /// Successful quotes within the refresh threshold of expiry, marked as refreshing
    async fn due_for_refresh(&self, request_id: u64) -> Vec<(usize, ProviderId)> {
        let mut state = self.state.write().await;
        if state.request_id != request_id {
            return Vec::new();
        }

        let threshold = self.config.refresh_threshold();
        let due: Vec<(usize, ProviderId)> = state
            .snapshot
            .quotes()
            .into_iter()
            .filter(|q| q.is_success() && q.time_to_expiry() <= threshold)
            .filter(|q| !state.refreshing.contains(&q.provider))
            .filter_map(|q| {
                state
                    .snapshot
                    .slot_of(&q.provider)
                    .map(|slot| (slot, q.provider.clone()))
            })
            .collect();

        for (_, provider) in &due {
            state.refreshing.insert(provider.clone());
        }
        due
    }

    async fn refresh_loop(shared: Arc<Self>, request_id: u64, route: Route) {
        let interval = shared.config.refresh_check_interval();
        loop {
            sleep(interval).await;
            if !shared.is_current(request_id) {
                break;
            }

            let due = shared.due_for_refresh(request_id).await;
            if due.is_empty() {
                continue;
            }

            for (_, provider) in &due {
                info!("Refreshing expiring {} quote (request {})", provider, request_id);
                metrics::record_quote_refresh(provider);
            }
            Shared::dispatch(&shared, request_id, &route, due, UpdateKind::Refresh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, ChainCatalog, ChainFamily, Token};
    use crate::config::ProviderConfig;
    use crate::error::ErrorKind;
    use crate::provider::MockProviderAdapter;
    use crate::quote::FeeBreakdown;
    use std::collections::HashMap;

    fn catalog() -> Arc<ChainCatalog> {
        let chain = |id: &str| Chain {
            id: id.to_string(),
            name: id.to_string(),
            native_token: "NATIVE".to_string(),
            family: ChainFamily::Evm,
            providers: vec![ProviderId::from("alpha"), ProviderId::from("beta")],
            rpc_urls: vec![],
            explorer_url: None,
            confirmation_blocks: 1,
        };
        let token = Token {
            symbol: "USDC".to_string(),
            name: "USD Coin".to_string(),
            decimals: 6,
            addresses: HashMap::from([
                ("ethereum".to_string(), "0x1".to_string()),
                ("arbitrum".to_string(), "0x2".to_string()),
            ]),
            price_usd: None,
        };
        let provider = ProviderConfig {
            tokens: vec!["USDC".to_string()],
            ..ProviderConfig::default()
        };
        Arc::new(ChainCatalog::new(
            vec![chain("ethereum"), chain("arbitrum")],
            vec![token],
            vec![
                (ProviderId::from("alpha"), provider.clone()),
                (ProviderId::from("beta"), provider),
            ],
        ))
    }

    fn config() -> EngineConfig {
        EngineConfig {
            debounce_ms: 10,
            provider_timeout_ms: 1_000,
            auto_refresh: false,
            ..EngineConfig::default()
        }
    }

    fn alpha() -> MockProviderAdapter {
        let mut adapter = MockProviderAdapter::new();
        adapter
            .expect_provider_id()
            .return_const(ProviderId::from("alpha"));
        adapter.expect_get_quote().times(1).returning(|route| {
            Quote::success(
                ProviderId::from("alpha"),
                route.amount.to_string(),
                FeeBreakdown::zero(),
                "3 min",
            )
        });
        adapter
    }

    fn route() -> Route {
        Route::new("ethereum", "arbitrum", "USDC", "USDC", "42").unwrap()
    }

    #[tokio::test]
    async fn test_unregistered_provider_yields_provider_error() {
        let registry = ProviderRegistry::new().with(Arc::new(alpha()));
        let aggregator = QuoteAggregator::new(
            RouteResolver::new(catalog()),
            Arc::new(registry),
            config(),
            EventBus::default(),
        );

        let mut stream = aggregator.fetch_quotes(route()).await.unwrap();
        let snapshot = stream.until_complete().await.unwrap();

        assert_eq!(snapshot.len(), 2);
        let beta = snapshot.quote_for_provider(&ProviderId::from("beta")).unwrap();
        let error = beta.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::ProviderError);
        assert!(error.message.contains("integration not implemented"));
        assert_eq!(snapshot.best().unwrap().estimated_receive_amount, "42");
    }

    #[tokio::test]
    async fn test_refresh_requires_previous_request() {
        let aggregator = QuoteAggregator::new(
            RouteResolver::new(catalog()),
            Arc::new(ProviderRegistry::new()),
            config(),
            EventBus::default(),
        );
        let err = aggregator.refresh_quotes().await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_sort_order_resorts_live_snapshot() {
        let mut beta = MockProviderAdapter::new();
        beta.expect_provider_id()
            .return_const(ProviderId::from("beta"));
        beta.expect_get_quote().returning(|_| {
            Quote::success(ProviderId::from("beta"), "1", FeeBreakdown::zero(), "1 min")
        });
        let registry = ProviderRegistry::new()
            .with(Arc::new(alpha()))
            .with(Arc::new(beta));
        let aggregator = QuoteAggregator::new(
            RouteResolver::new(catalog()),
            Arc::new(registry),
            config(),
            EventBus::default(),
        );

        let mut stream = aggregator.fetch_quotes(route()).await.unwrap();
        stream.until_complete().await.unwrap();
        assert_eq!(aggregator.snapshot().await.best().unwrap().provider.as_str(), "alpha");

        let fastest = aggregator.set_sort_order(SortOrder::Fastest).await;
        assert_eq!(fastest.best().unwrap().provider.as_str(), "beta");
        assert_eq!(aggregator.snapshot().await.sort, SortOrder::Fastest);

        aggregator.clear().await;
        assert!(aggregator.snapshot().await.is_empty());
    }
}
