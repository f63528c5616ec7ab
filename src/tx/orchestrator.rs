//! Transaction execution against a selected quote
//!
//! `execute` validates the request synchronously, then a background task
//! submits through the provider's adapter and polls status until the
//! transaction is confirmed, fails, or polling times out.

use super::{ExecutionState, TransactionHandle, TransactionStatus, TxState};
use crate::chain::ProviderId;
use crate::config::OrchestratorConfig;
use crate::error::{BridgeError, BridgeResult, ErrorKind};
use crate::events::EventBus;
use crate::metrics;
use crate::provider::{ProviderAdapter, ProviderRegistry, TransactionRequest};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Status polling parameters for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Give up polling after this long; the handle stays pending
    pub status_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&OrchestratorConfig> for ExecuteOptions {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            status_timeout: Duration::from_secs(config.status_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

/// Drives transactions from a selected quote to a terminal state
pub struct TransactionOrchestrator {
    registry: Arc<ProviderRegistry>,
    options: ExecuteOptions,
    /// Handles still in flight, by id
    handles: Arc<DashMap<Uuid, TransactionHandle>>,
    events: EventBus,
}

impl TransactionOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, config: &OrchestratorConfig, events: EventBus) -> Self {
        Self {
            registry,
            options: ExecuteOptions::from(config),
            handles: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Execute with the configured polling options.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn execute(&self, request: TransactionRequest) -> TransactionHandle {
        self.execute_with(request, self.options)
    }

    /// Execute with caller-supplied polling options
    pub fn execute_with(&self, request: TransactionRequest, options: ExecuteOptions) -> TransactionHandle {
        let provider = request.quote.as_ref().map(|q| q.provider.clone());
        let handle = TransactionHandle::new(provider, self.events.clone());

        let generation = handle.generation();
        handle.transition(generation, |s| s.state = ExecutionState::Signing);

        if let Err(error) = validate(&request) {
            warn!("Transaction {} rejected: {}", handle.id(), error);
            handle.transition(generation, |s| s.error = Some(error));
            return handle;
        }

        // validated above
        let Some(provider) = request.quote.as_ref().map(|q| q.provider.clone()) else {
            return handle;
        };

        let Some(adapter) = self.registry.get(&provider) else {
            let error = BridgeError::provider_error(&provider, "Unsupported bridge provider")
                .with_retryable(false);
            error!("Transaction {} has no adapter for {}", handle.id(), provider);
            metrics::record_tx_failed(&provider, error.kind);
            handle.transition(generation, |s| {
                s.state = ExecutionState::Failed;
                s.error = Some(error);
            });
            return handle;
        };

        info!("Executing transaction {} via {}", handle.id(), provider);
        self.handles.insert(handle.id(), handle.clone());
        let handles = self.handles.clone();
        let tracked = handle.clone();
        tokio::spawn(async move {
            let id = tracked.id();
            drive(tracked, generation, adapter, request, options).await;
            handles.remove(&id);
        });
        handle
    }

    /// One-shot status lookup
    pub async fn check_status(&self, provider: &ProviderId, hash: &str) -> BridgeResult<TransactionStatus> {
        let adapter = self.adapter(provider)?;
        adapter.get_status(hash).await.map_err(|e| match e.provider {
            Some(_) => e,
            None => e.with_provider(provider.clone()),
        })
    }

    /// Network fee estimate for a request
    pub async fn estimate_gas(&self, request: &TransactionRequest) -> BridgeResult<String> {
        let quote = request.quote()?;
        let adapter = self.adapter(&quote.provider)?;
        adapter.estimate_gas(request).await.map_err(|e| match e.kind {
            ErrorKind::ValidationError => e,
            _ => BridgeError::provider_error(
                &quote.provider,
                format!("Failed to estimate gas: {}", e.message),
            ),
        })
    }

    pub fn handle(&self, id: &Uuid) -> Option<TransactionHandle> {
        self.handles.get(id).map(|h| h.value().clone())
    }

    /// Stop tracking a handle without invalidating it
    pub fn forget(&self, id: &Uuid) -> Option<TransactionHandle> {
        self.handles.remove(id).map(|(_, h)| h)
    }

    /// Number of executions still being driven
    pub fn active(&self) -> usize {
        self.handles.len()
    }

    /// Invalidate every handle and stop tracking them
    pub fn invalidate_all(&self) {
        let count = self.handles.len();
        for entry in self.handles.iter() {
            entry.value().invalidate();
        }
        self.handles.clear();
        if count > 0 {
            info!("Invalidated {} transaction handle(s)", count);
        }
    }

    fn adapter(&self, provider: &ProviderId) -> BridgeResult<Arc<dyn ProviderAdapter>> {
        self.registry.get(provider).ok_or_else(|| {
            BridgeError::provider_error(provider, "Unsupported bridge provider").with_retryable(false)
        })
    }
}

/// Request checks, in order: quote, account, signer, then quote freshness
fn validate(request: &TransactionRequest) -> BridgeResult<()> {
    let quote = request.quote()?;
    request.account()?;
    request.signer()?;

    if quote.is_loading {
        return Err(BridgeError::validation_error("quote", "Quote is still loading"));
    }
    if let Some(error) = &quote.error {
        return Err(BridgeError::validation_error(
            "quote",
            &format!("Quote is not executable: {}", error.message),
        ));
    }
    if quote.is_expired() {
        return Err(BridgeError::quote_expired(&quote.provider));
    }
    Ok(())
}

async fn drive(
    handle: TransactionHandle,
    generation: u64,
    adapter: Arc<dyn ProviderAdapter>,
    request: TransactionRequest,
    options: ExecuteOptions,
) {
    let provider = adapter.provider_id().clone();

    let hash = match adapter.build_and_submit(&request).await {
        Ok(hash) => hash,
        Err(e) => {
            error!("Transaction {} submission failed: {}", handle.id(), e);
            metrics::record_tx_failed(&provider, e.kind);
            handle.transition(generation, |s| {
                s.state = ExecutionState::Failed;
                s.error = Some(e);
            });
            return;
        }
    };

    metrics::record_tx_submitted(&provider);
    info!("Transaction {} submitted: {}", handle.id(), hash);

    let submitted = handle.transition(generation, |s| {
        s.state = ExecutionState::Submitted;
        s.hash = Some(hash.clone());
    });
    if !submitted || !handle.transition(generation, |s| s.state = ExecutionState::Pending) {
        debug!("Transaction {} invalidated after submission", handle.id());
        return;
    }

    poll_status(&handle, generation, adapter.as_ref(), &provider, &hash, options).await;
}

async fn poll_status(
    handle: &TransactionHandle,
    generation: u64,
    adapter: &dyn ProviderAdapter,
    provider: &ProviderId,
    hash: &str,
    options: ExecuteOptions,
) {
    let deadline = Instant::now() + options.status_timeout;
    let mut last_error: Option<BridgeError> = None;

    loop {
        if handle.generation() != generation {
            debug!("Stopped polling {} (handle invalidated)", hash);
            return;
        }

        match adapter.get_status(hash).await {
            Ok(status) => match status.state {
                TxState::Confirmed => {
                    info!(
                        "Transaction {} confirmed ({} confirmations)",
                        hash, status.confirmations
                    );
                    if handle.transition(generation, |s| {
                        s.state = ExecutionState::Confirmed;
                        s.status = Some(status);
                    }) {
                        metrics::record_tx_confirmed(provider);
                    }
                    return;
                }
                TxState::Failed => {
                    let e = BridgeError::transaction_failed(hash, None).with_provider(provider.clone());
                    error!("Transaction {} failed on chain", hash);
                    if handle.transition(generation, |s| {
                        s.state = ExecutionState::Failed;
                        s.status = Some(status);
                        s.error = Some(e);
                    }) {
                        metrics::record_tx_failed(provider, ErrorKind::TransactionFailed);
                    }
                    return;
                }
                TxState::Pending => {
                    if handle.snapshot().status.as_ref() != Some(&status) {
                        handle.transition(generation, |s| s.status = Some(status));
                    }
                }
            },
            Err(e) => {
                warn!("Status lookup for {} failed: {}", hash, e);
                last_error = Some(e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(options.poll_interval.min(deadline - now)).await;
    }

    warn!(
        "Transaction {} still pending after {:?}; giving up on status polling",
        hash, options.status_timeout
    );
    let error = BridgeError::network_error(
        format!(
            "Transaction status polling timed out after {}ms",
            options.status_timeout.as_millis()
        ),
        Some(provider),
    )
    .with_detail(serde_json::json!({
        "hash": hash,
        "lastError": last_error.map(|e| e.message),
    }));
    if handle.transition(generation, |s| s.error = Some(error)) {
        metrics::record_status_timeout(provider);
    }
}
