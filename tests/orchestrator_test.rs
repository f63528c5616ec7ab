//! Transaction execution from aggregated quotes

mod mocks;

use std::sync::Arc;
use std::time::Duration;

use bridge_quote_engine::config::OrchestratorConfig;
use bridge_quote_engine::quote::{FeeBreakdown, Quote};
use bridge_quote_engine::tx::{ExecuteOptions, TxState};
use bridge_quote_engine::{
    EngineEvent, ErrorKind, EventBus, ExecutionState, ProviderId, ProviderRegistry,
    QuoteAggregator, RouteResolver, TransactionOrchestrator, TransactionRequest, UserAction,
};
use chrono::Utc;
use mocks::{catalog, engine_config, route, SequentialSigner, TimingControlledAdapter};
use tokio::time::{sleep, timeout};

const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

fn orchestrator(adapter: &TimingControlledAdapter, events: EventBus) -> TransactionOrchestrator {
    let registry = ProviderRegistry::new().with(Arc::new(adapter.clone()));
    TransactionOrchestrator::new(Arc::new(registry), &OrchestratorConfig::default(), events)
}

fn fast() -> ExecuteOptions {
    ExecuteOptions {
        status_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
    }
}

fn fresh_quote(provider: &str) -> Quote {
    Quote::success(
        ProviderId::new(provider),
        "24.9",
        FeeBreakdown::zero(),
        "8-12 min",
    )
    .finalize(Duration::from_secs(30))
}

#[tokio::test]
async fn test_expired_quote_is_rejected_before_submission() {
    let wormhole = TimingControlledAdapter::fast("wormhole", "1");
    let orchestrator = orchestrator(&wormhole, EventBus::default());

    let mut quote = fresh_quote("wormhole");
    quote.expires_at = Utc::now() - chrono::Duration::milliseconds(5_000);

    let handle = orchestrator.execute_with(
        TransactionRequest::new(quote, ACCOUNT, Arc::new(SequentialSigner::default())),
        fast(),
    );

    let error = handle.error().expect("expired quote should be rejected");
    assert_eq!(error.kind, ErrorKind::QuoteExpired);
    assert!(error.retryable);
    assert_eq!(error.action(), UserAction::RefreshQuotes);
    assert_eq!(handle.state(), ExecutionState::Signing);
    assert!(handle.hash().is_none());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(wormhole.submit_count(), 0);
}

#[tokio::test]
async fn test_missing_signer_is_a_validation_error() {
    let wormhole = TimingControlledAdapter::fast("wormhole", "1");
    let orchestrator = orchestrator(&wormhole, EventBus::default());

    let request = TransactionRequest {
        quote: Some(fresh_quote("wormhole")),
        account: Some(ACCOUNT.to_string()),
        signer: None,
    };
    let handle = orchestrator.execute_with(request, fast());

    let settled = handle.settled().await;
    assert_eq!(settled.error.unwrap().kind, ErrorKind::ValidationError);
    assert_eq!(settled.state, ExecutionState::Signing);
    assert_eq!(wormhole.submit_count(), 0);
}

#[tokio::test]
async fn test_best_quote_executes_to_confirmation() {
    let wormhole = TimingControlledAdapter::fast("wormhole", "0.249").with_pending_polls(2);
    let rhino = TimingControlledAdapter::fast("rhino", "0.240");
    let events = EventBus::default();

    let registry = Arc::new(
        ProviderRegistry::new()
            .with(Arc::new(wormhole.clone()))
            .with(Arc::new(rhino.clone())),
    );
    let aggregator = QuoteAggregator::new(
        RouteResolver::new(catalog(&["wormhole", "rhino"])),
        registry.clone(),
        engine_config(),
        events.clone(),
    );
    let orchestrator =
        TransactionOrchestrator::new(registry, &OrchestratorConfig::default(), events.clone());

    let mut stream = aggregator.fetch_quotes(route("100")).await.unwrap();
    let snapshot = stream.until_complete().await.unwrap();
    let best = snapshot.best().unwrap().clone();
    assert_eq!(best.provider, ProviderId::new("wormhole"));

    let mut rx = events.subscribe();
    let handle = orchestrator.execute_with(
        TransactionRequest::new(best, ACCOUNT, Arc::new(SequentialSigner::default())),
        fast(),
    );

    let settled = timeout(Duration::from_secs(2), handle.settled())
        .await
        .expect("transaction should settle");
    assert_eq!(settled.state, ExecutionState::Confirmed);
    assert_eq!(settled.hash.as_deref(), Some(format!("0x{:064x}", 1).as_str()));
    assert!(settled.error.is_none());

    let status = settled.status.unwrap();
    assert_eq!(status.state, TxState::Confirmed);
    assert_eq!(status.confirmations, 2);

    assert_eq!(wormhole.submit_count(), 1);
    assert_eq!(rhino.submit_count(), 0);
    timeout(Duration::from_secs(1), async {
        while orchestrator.active() > 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("settled executions are no longer tracked");
    assert!(orchestrator.handle(&handle.id()).is_none());

    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::TransactionUpdated { snapshot } = event {
            if states.last() != Some(&snapshot.state) {
                states.push(snapshot.state);
            }
        }
    }
    assert_eq!(
        states,
        vec![
            ExecutionState::Signing,
            ExecutionState::Submitted,
            ExecutionState::Pending,
            ExecutionState::Confirmed
        ]
    );
}

#[tokio::test]
async fn test_invalidation_during_submission_freezes_state() {
    let slow = TimingControlledAdapter::fast("wormhole", "1").with_submit_delay(200);
    let orchestrator = orchestrator(&slow, EventBus::default());

    let handle = orchestrator.execute_with(
        TransactionRequest::new(
            fresh_quote("wormhole"),
            ACCOUNT,
            Arc::new(SequentialSigner::default()),
        ),
        fast(),
    );
    sleep(Duration::from_millis(50)).await;
    assert_eq!(slow.submit_count(), 1);

    handle.invalidate();
    sleep(Duration::from_millis(300)).await;

    let snapshot = handle.snapshot();
    assert!(snapshot.invalidated);
    assert_eq!(snapshot.state, ExecutionState::Signing);
    assert!(snapshot.hash.is_none());
    assert!(snapshot.status.is_none());
}

#[tokio::test]
async fn test_invalidate_all_stops_every_execution() {
    let slow = TimingControlledAdapter::fast("wormhole", "1").with_submit_delay(200);
    let orchestrator = orchestrator(&slow, EventBus::default());
    let signer = Arc::new(SequentialSigner::default());

    let first = orchestrator.execute_with(
        TransactionRequest::new(fresh_quote("wormhole"), ACCOUNT, signer.clone()),
        fast(),
    );
    let second = orchestrator.execute_with(
        TransactionRequest::new(fresh_quote("wormhole"), ACCOUNT, signer),
        fast(),
    );
    assert_eq!(orchestrator.active(), 2);

    orchestrator.invalidate_all();
    assert_eq!(orchestrator.active(), 0);

    sleep(Duration::from_millis(300)).await;
    for handle in [first, second] {
        assert!(handle.is_invalidated());
        assert_eq!(handle.state(), ExecutionState::Signing);
        assert!(handle.hash().is_none());
    }
}

#[tokio::test]
async fn test_unknown_provider_fails_immediately() {
    let wormhole = TimingControlledAdapter::fast("wormhole", "1");
    let orchestrator = orchestrator(&wormhole, EventBus::default());

    let handle = orchestrator.execute_with(
        TransactionRequest::new(
            fresh_quote("snowbridge"),
            ACCOUNT,
            Arc::new(SequentialSigner::default()),
        ),
        fast(),
    );

    assert_eq!(handle.state(), ExecutionState::Failed);
    let error = handle.error().unwrap();
    assert_eq!(error.kind, ErrorKind::ProviderError);
    assert!(!error.retryable);

    let status = orchestrator
        .check_status(&ProviderId::new("snowbridge"), "0xabc")
        .await;
    assert_eq!(status.unwrap_err().kind, ErrorKind::ProviderError);
}
