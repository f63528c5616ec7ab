//! Timing-controlled adapters and signers for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_quote_engine::chain::{Chain, ChainCatalog, ChainFamily, Token};
use bridge_quote_engine::config::{EngineConfig, ProviderConfig};
use bridge_quote_engine::provider::{ProviderAdapter, TransactionRequest, UnsignedTransfer, WalletSigner};
use bridge_quote_engine::quote::{FeeBreakdown, Quote};
use bridge_quote_engine::tx::{TransactionStatus, TxState};
use bridge_quote_engine::{BridgeError, BridgeResult, ProviderId, Route};
use rust_decimal::Decimal;

/// Call tracking for verifying which adapters were actually called
#[derive(Debug, Clone, Default)]
pub struct CallTracker {
    pub calls: Arc<AtomicUsize>,
    pub amounts: Arc<Mutex<Vec<Decimal>>>,
}

impl CallTracker {
    pub fn record_call(&self, amount: Decimal) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut amounts) = self.amounts.lock() {
            amounts.push(amount);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn amounts(&self) -> Vec<Decimal> {
        self.amounts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

/// Adapter that answers after a configurable delay
#[derive(Debug, Clone)]
pub struct TimingControlledAdapter {
    pub id: ProviderId,
    pub response_delay_ms: u64,
    pub should_fail: bool,
    /// Receive amount per unit of source amount
    pub rate: Decimal,
    pub estimated_time: String,
    pub submit_delay_ms: u64,
    /// Status polls answered `pending` before `confirmed`
    pub pending_polls: usize,
    pub quotes: CallTracker,
    pub submits: Arc<AtomicUsize>,
    pub polls: Arc<AtomicUsize>,
}

impl TimingControlledAdapter {
    /// Create a fast-responding adapter (responds in ~10ms)
    pub fn fast(id: &str, rate: &str) -> Self {
        Self::new(id, 10, false, rate)
    }

    /// Create an adapter that outlives any short provider timeout
    pub fn timeout(id: &str) -> Self {
        Self::new(id, 2_000, false, "1")
    }

    /// Create an adapter that always fails
    pub fn failing(id: &str) -> Self {
        Self::new(id, 10, true, "0")
    }

    pub fn new(id: &str, response_delay_ms: u64, should_fail: bool, rate: &str) -> Self {
        Self {
            id: ProviderId::new(id),
            response_delay_ms,
            should_fail,
            rate: rate.parse().unwrap_or(Decimal::ONE),
            estimated_time: "5-10 min".to_string(),
            submit_delay_ms: 0,
            pending_polls: 0,
            quotes: CallTracker::default(),
            submits: Arc::new(AtomicUsize::new(0)),
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_time(mut self, estimated_time: &str) -> Self {
        self.estimated_time = estimated_time.to_string();
        self
    }

    pub fn with_submit_delay(mut self, ms: u64) -> Self {
        self.submit_delay_ms = ms;
        self
    }

    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn call_count(&self) -> usize {
        self.quotes.call_count()
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for TimingControlledAdapter {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    async fn get_quote(&self, route: &Route) -> Quote {
        self.quotes.record_call(route.amount);
        tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;

        if self.should_fail {
            return Quote::failed(
                self.id.clone(),
                BridgeError::provider_error(&self.id, "configured to fail"),
            );
        }

        Quote::success(
            self.id.clone(),
            (route.amount * self.rate).normalize().to_string(),
            FeeBreakdown::zero(),
            self.estimated_time.clone(),
        )
        .with_provider_data(serde_json::json!({ "amount": route.amount.to_string() }))
    }

    async fn build_and_submit(&self, request: &TransactionRequest) -> BridgeResult<String> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        let signer = request.signer()?;
        if self.submit_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.submit_delay_ms)).await;
        }

        let transfer = UnsignedTransfer {
            chain_id: "moonbeam".to_string(),
            family: ChainFamily::Evm,
            to: None,
            from: request.account()?.to_string(),
            amount: "1".to_string(),
            payload: serde_json::json!({ "submission": n }),
        };
        signer
            .sign_and_send(transfer)
            .await
            .map_err(|e| BridgeError::classify(Some(&self.id), &e))
    }

    async fn get_status(&self, hash: &str) -> BridgeResult<TransactionStatus> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        if n < self.pending_polls {
            return Ok(TransactionStatus::pending(hash));
        }
        Ok(TransactionStatus {
            hash: hash.to_string(),
            state: TxState::Confirmed,
            confirmations: 2,
            block_number: Some(1_000),
            timestamp: Some(1_700_000_000),
        })
    }
}

/// Signer that hands out sequential hashes
#[derive(Debug, Default)]
pub struct SequentialSigner {
    pub sent: AtomicUsize,
}

#[async_trait]
impl WalletSigner for SequentialSigner {
    fn address(&self) -> String {
        "0x00000000000000000000000000000000000000aa".to_string()
    }

    async fn sign_and_send(&self, _transfer: UnsignedTransfer) -> anyhow::Result<String> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0x{:064x}", n + 1))
    }
}

/// Moonbeam and Solana, both served by `providers`, with GLMR and USDC
pub fn catalog(providers: &[&str]) -> Arc<ChainCatalog> {
    catalog_with(providers, providers)
}

pub fn catalog_with(source_providers: &[&str], destination_providers: &[&str]) -> Arc<ChainCatalog> {
    let chain = |id: &str, family: ChainFamily, providers: &[&str]| Chain {
        id: id.to_string(),
        name: id.to_string(),
        native_token: "NATIVE".to_string(),
        family,
        providers: providers.iter().map(|p| ProviderId::new(*p)).collect(),
        rpc_urls: vec![],
        explorer_url: None,
        confirmation_blocks: 2,
    };
    let token = |symbol: &str, chains: &[&str]| Token {
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        decimals: 6,
        addresses: chains
            .iter()
            .map(|c| (c.to_string(), format!("{}:{}", c, symbol)))
            .collect::<HashMap<_, _>>(),
        price_usd: None,
    };

    let mut all: Vec<&str> = source_providers.to_vec();
    for p in destination_providers {
        if !all.contains(p) {
            all.push(*p);
        }
    }

    Arc::new(ChainCatalog::new(
        vec![
            chain("moonbeam", ChainFamily::Evm, source_providers),
            chain("solana", ChainFamily::Solana, destination_providers),
        ],
        vec![
            token("GLMR", &["moonbeam"]),
            token("USDC", &["moonbeam", "solana"]),
        ],
        all.into_iter()
            .map(|p| {
                (
                    ProviderId::new(p),
                    ProviderConfig {
                        tokens: vec!["GLMR".to_string(), "USDC".to_string()],
                        ..ProviderConfig::default()
                    },
                )
            })
            .collect(),
    ))
}

pub fn route(amount: &str) -> Route {
    Route::new("moonbeam", "solana", "GLMR", "USDC", amount).expect("valid route")
}

/// Short windows so tests run in milliseconds
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        debounce_ms: 30,
        provider_timeout_ms: 300,
        quote_validity_ms: 30_000,
        refresh_threshold_ms: 10_000,
        refresh_check_interval_ms: 1_000,
        auto_refresh: false,
    }
}
