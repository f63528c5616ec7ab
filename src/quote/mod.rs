//! Quote module - quote model, ranking and aggregation
//!
//! This module provides:
//! - The immutable [`Quote`] record produced by provider adapters
//! - Copy-on-write ranked snapshots of an aggregation round
//! - The [`QuoteAggregator`] fanning requests out to every eligible provider

mod aggregator;
pub mod ranking;

pub use aggregator::QuoteAggregator;
pub use ranking::SortOrder;

use crate::chain::{ProviderId, Route};
use crate::error::BridgeError;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

/// Fee components as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub bridge_fee: String,
    pub gas_fee: String,
    pub total: String,
}

impl FeeBreakdown {
    pub fn zero() -> Self {
        Self {
            bridge_fee: "0".to_string(),
            gas_fee: "0".to_string(),
            total: "0".to_string(),
        }
    }
}

/// A provider's offer for a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub provider: ProviderId,
    pub estimated_receive_amount: String,
    pub fees: FeeBreakdown,
    pub estimated_time: String,
    pub route_label: Option<String>,
    pub is_loading: bool,
    pub error: Option<BridgeError>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Opaque data the provider needs to execute this quote
    pub provider_data: Option<serde_json::Value>,
}

impl Quote {
    fn base(provider: ProviderId) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            provider,
            estimated_receive_amount: "0".to_string(),
            fees: FeeBreakdown::zero(),
            estimated_time: "N/A".to_string(),
            route_label: None,
            is_loading: false,
            error: None,
            issued_at: now,
            expires_at: now,
            provider_data: None,
        }
    }

    /// Placeholder shown while a provider is in flight
    pub fn loading(provider: ProviderId) -> Self {
        let mut quote = Self::base(provider);
        quote.is_loading = true;
        quote.estimated_time = "...".to_string();
        quote
    }

    /// Degraded entry for a provider that could not quote
    pub fn failed(provider: ProviderId, error: BridgeError) -> Self {
        let mut quote = Self::base(provider);
        quote.error = Some(error);
        quote
    }

    /// Successful quote, not yet finalized
    pub fn success(
        provider: ProviderId,
        estimated_receive_amount: impl Into<String>,
        fees: FeeBreakdown,
        estimated_time: impl Into<String>,
    ) -> Self {
        let mut quote = Self::base(provider);
        quote.estimated_receive_amount = estimated_receive_amount.into();
        quote.fees = fees;
        quote.estimated_time = estimated_time.into();
        quote
    }

    pub fn with_route_label(mut self, label: Option<String>) -> Self {
        self.route_label = label;
        self
    }

    pub fn with_provider_data(mut self, data: serde_json::Value) -> Self {
        self.provider_data = Some(data);
        self
    }

    /// Stamp issue time, expiry and id.
    ///
    /// `expires_at` is never earlier than `issued_at + validity`; an adapter
    /// may set a later expiry before finalizing.
    pub fn finalize(mut self, validity: Duration) -> Self {
        let now = Utc::now();
        let earliest = now + chrono::Duration::milliseconds(validity.as_millis() as i64);
        self.issued_at = now;
        if self.expires_at < earliest {
            self.expires_at = earliest;
        }
        self.id = self.derive_id();
        self
    }

    fn derive_id(&self) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(self.provider.as_str().as_bytes());
        hasher.update(self.estimated_receive_amount.as_bytes());
        hasher.update(self.fees.total.as_bytes());
        hasher.update(
            self.issued_at
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        let digest = hasher.finalize();
        format!("0x{}", hex::encode(&digest[..16]))
    }

    /// Landed without error
    pub fn is_success(&self) -> bool {
        !self.is_loading && self.error.is_none()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left before expiry, zero once expired
    pub fn time_to_expiry(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Ranked view of one aggregation round
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub request_id: u64,
    pub route: Option<Route>,
    pub sort: SortOrder,
    /// `(slot, quote)` with landed quotes ranked first, then loading placeholders
    entries: Vec<(usize, Quote)>,
}

impl QuoteSnapshot {
    pub fn empty(request_id: u64, sort: SortOrder) -> Self {
        Self {
            request_id,
            route: None,
            sort,
            entries: Vec::new(),
        }
    }

    /// Snapshot holding one loading placeholder per provider
    pub fn loading(request_id: u64, route: Route, sort: SortOrder, providers: &[ProviderId]) -> Self {
        Self {
            request_id,
            route: Some(route),
            sort,
            entries: providers
                .iter()
                .enumerate()
                .map(|(slot, p)| (slot, Quote::loading(p.clone())))
                .collect(),
        }
    }

    /// New snapshot with the entry for `slot` replaced
    pub fn with_quote(&self, slot: usize, quote: Quote) -> Self {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|(s, _)| *s != slot)
            .cloned()
            .collect();
        entries.push((slot, quote));
        Self::ranked(self.request_id, self.route.clone(), self.sort, entries)
    }

    /// New snapshot under a different order
    pub fn resorted(&self, sort: SortOrder) -> Self {
        Self::ranked(self.request_id, self.route.clone(), sort, self.entries.clone())
    }

    fn ranked(
        request_id: u64,
        route: Option<Route>,
        sort: SortOrder,
        entries: Vec<(usize, Quote)>,
    ) -> Self {
        let (mut landed, mut loading): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|(_, q)| !q.is_loading);
        ranking::rank(&mut landed, sort);
        loading.sort_by_key(|(slot, _)| *slot);
        landed.extend(loading);

        Self {
            request_id,
            route,
            sort,
            entries: landed,
        }
    }

    /// Landed quotes (successful and failed) in rank order
    pub fn quotes(&self) -> Vec<&Quote> {
        self.entries
            .iter()
            .map(|(_, q)| q)
            .filter(|q| !q.is_loading)
            .collect()
    }

    /// Every entry, loading placeholders last
    pub fn entries(&self) -> Vec<&Quote> {
        self.entries.iter().map(|(_, q)| q).collect()
    }

    pub fn quote_for_provider(&self, provider: &ProviderId) -> Option<&Quote> {
        self.entries
            .iter()
            .map(|(_, q)| q)
            .find(|q| &q.provider == provider)
    }

    pub(crate) fn slot_of(&self, provider: &ProviderId) -> Option<usize> {
        self.entries
            .iter()
            .find(|(_, q)| &q.provider == provider)
            .map(|(slot, _)| *slot)
    }

    /// Best successful quote under the active order
    pub fn best(&self) -> Option<&Quote> {
        self.entries.iter().map(|(_, q)| q).find(|q| q.is_success())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// No provider left in flight
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|(_, q)| !q.is_loading)
    }
}

/// Why an update was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Initial,
    Refresh,
}

/// One landed quote and the snapshot it produced
#[derive(Debug, Clone)]
pub struct QuoteUpdate {
    pub request_id: u64,
    pub quote: Quote,
    pub snapshot: Arc<QuoteSnapshot>,
    pub kind: UpdateKind,
}

/// Incremental results of one `fetch_quotes` call.
///
/// Ends when the request is superseded, cleared or the aggregator shuts down.
#[derive(Debug)]
pub struct QuoteStream {
    request_id: u64,
    rx: mpsc::UnboundedReceiver<QuoteUpdate>,
}

impl QuoteStream {
    pub(crate) fn new(request_id: u64, rx: mpsc::UnboundedReceiver<QuoteUpdate>) -> Self {
        Self { request_id, rx }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub async fn next_update(&mut self) -> Option<QuoteUpdate> {
        self.rx.recv().await
    }

    /// Wait until every provider has landed, returning the last snapshot
    pub async fn until_complete(&mut self) -> Option<Arc<QuoteSnapshot>> {
        while let Some(update) = self.rx.recv().await {
            if update.snapshot.is_complete() {
                return Some(update.snapshot);
            }
        }
        None
    }
}

impl Stream for QuoteStream {
    type Item = QuoteUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route::new("moonbeam", "solana", "GLMR", "USDC", "100").unwrap()
    }

    fn ids(names: &[&str]) -> Vec<ProviderId> {
        names.iter().map(|n| ProviderId::from(*n)).collect()
    }

    #[test]
    fn test_finalize_sets_expiry_window() {
        let quote = Quote::success(ProviderId::from("a"), "10", FeeBreakdown::zero(), "5 min")
            .finalize(Duration::from_secs(30));

        assert!(quote.expires_at >= quote.issued_at + chrono::Duration::seconds(30));
        assert!(quote.id.starts_with("0x"));
        assert_eq!(quote.id.len(), 34);
        assert!(!quote.is_expired());
    }

    #[test]
    fn test_finalize_keeps_later_expiry() {
        let mut quote = Quote::success(ProviderId::from("a"), "10", FeeBreakdown::zero(), "5 min");
        let later = Utc::now() + chrono::Duration::minutes(5);
        quote.expires_at = later;
        let quote = quote.finalize(Duration::from_secs(30));
        assert_eq!(quote.expires_at, later);
    }

    #[test]
    fn test_expiry_check() {
        let mut quote = Quote::success(ProviderId::from("a"), "10", FeeBreakdown::zero(), "5 min");
        quote.expires_at = Utc::now() - chrono::Duration::milliseconds(5000);
        assert!(quote.is_expired());
        assert_eq!(quote.time_to_expiry(), Duration::ZERO);
    }

    #[test]
    fn test_snapshot_ranks_landed_before_loading() {
        let snapshot = QuoteSnapshot::loading(1, route(), SortOrder::BestRate, &ids(&["a", "b", "c"]));
        assert_eq!(snapshot.len(), 3);
        assert!(!snapshot.is_complete());
        assert!(snapshot.quotes().is_empty());

        let snapshot = snapshot.with_quote(
            2,
            Quote::success(ProviderId::from("c"), "5", FeeBreakdown::zero(), "1 min"),
        );
        let snapshot = snapshot.with_quote(
            0,
            Quote::success(ProviderId::from("a"), "7", FeeBreakdown::zero(), "9 min"),
        );

        let order: Vec<_> = snapshot.entries().iter().map(|q| q.provider.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
        assert_eq!(snapshot.quotes().len(), 2);
        assert_eq!(snapshot.best().unwrap().provider.as_str(), "a");

        let fastest = snapshot.resorted(SortOrder::Fastest);
        assert_eq!(fastest.best().unwrap().provider.as_str(), "c");
        assert_eq!(fastest.slot_of(&ProviderId::from("b")), Some(1));
    }

    #[test]
    fn test_failed_quote_is_not_best() {
        let snapshot = QuoteSnapshot::loading(1, route(), SortOrder::Fastest, &ids(&["a", "b"]))
            .with_quote(
                0,
                Quote::failed(
                    ProviderId::from("a"),
                    BridgeError::network_error("timeout", None),
                ),
            )
            .with_quote(
                1,
                Quote::success(ProviderId::from("b"), "1", FeeBreakdown::zero(), "30 min"),
            );

        assert!(snapshot.is_complete());
        assert_eq!(snapshot.best().unwrap().provider.as_str(), "b");
        assert_eq!(snapshot.quotes()[1].provider.as_str(), "a");
    }
}
