//! Provider module - bridge provider integrations
//!
//! Every bridge provider is reached through a [`ProviderAdapter`]. Adapters are
//! registered by provider id in a [`ProviderRegistry`] shared by the quote
//! aggregator and the transaction orchestrator.

mod wormhole;

pub use wormhole::WormholeAdapter;

use crate::chain::{ChainCatalog, ChainFamily, ProviderId, Route};
use crate::error::{BridgeError, BridgeResult};
use crate::quote::Quote;
use crate::tx::TransactionStatus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// A transfer handed to the wallet for signing and broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedTransfer {
    pub chain_id: String,
    pub family: ChainFamily,
    /// Bridge contract or program receiving the transfer
    pub to: Option<String>,
    pub from: String,
    /// Source amount as a decimal string
    pub amount: String,
    /// Provider-specific payload
    pub payload: serde_json::Value,
}

/// Wallet capability supplied by the caller. Only adapters call it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Connected account address
    fn address(&self) -> String;

    /// Sign and broadcast, returning the transaction hash
    async fn sign_and_send(&self, transfer: UnsignedTransfer) -> anyhow::Result<String>;
}

/// Everything needed to execute a selected quote
#[derive(Clone, Default)]
pub struct TransactionRequest {
    pub quote: Option<Quote>,
    pub account: Option<String>,
    pub signer: Option<Arc<dyn WalletSigner>>,
}

impl TransactionRequest {
    pub fn new(quote: Quote, account: impl Into<String>, signer: Arc<dyn WalletSigner>) -> Self {
        Self {
            quote: Some(quote),
            account: Some(account.into()),
            signer: Some(signer),
        }
    }

    pub fn quote(&self) -> BridgeResult<&Quote> {
        self.quote
            .as_ref()
            .ok_or_else(|| BridgeError::validation_error("quote", "Quote is required"))
    }

    pub fn account(&self) -> BridgeResult<&str> {
        match self.account.as_deref() {
            Some(account) if !account.trim().is_empty() => Ok(account),
            _ => Err(BridgeError::validation_error(
                "userAddress",
                "User address is required",
            )),
        }
    }

    pub fn signer(&self) -> BridgeResult<&Arc<dyn WalletSigner>> {
        self.signer
            .as_ref()
            .ok_or_else(|| BridgeError::validation_error("signer", "Wallet signer is required"))
    }
}

impl fmt::Debug for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRequest")
            .field("quote", &self.quote.as_ref().map(|q| &q.id))
            .field("account", &self.account)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

/// Integration with one bridge provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider this adapter serves
    fn provider_id(&self) -> &ProviderId;

    /// Quote a route. Never fails: failures are encoded in the returned quote.
    async fn get_quote(&self, route: &Route) -> Quote;

    /// Build, sign and broadcast the transfer for a quote, returning its hash.
    /// Must not partially submit.
    async fn build_and_submit(&self, request: &TransactionRequest) -> BridgeResult<String>;

    /// Look up a submitted transaction
    async fn get_status(&self, hash: &str) -> BridgeResult<TransactionStatus>;

    /// Estimated network fee for executing the request
    async fn estimate_gas(&self, request: &TransactionRequest) -> BridgeResult<String> {
        Ok(request.quote()?.fees.gas_fee.clone())
    }
}

/// Adapters keyed by provider id
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own provider id, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let id = adapter.provider_id().clone();
        if self.adapters.insert(id.clone(), adapter).is_some() {
            warn!("Replaced adapter for provider {}", id);
        }
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.adapters.contains_key(id)
    }

    /// Registered provider ids ordered by id
    pub fn ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

/// Build the registry of every integration available for the catalog.
///
/// Providers listed in the catalog without an integration stay unregistered;
/// quoting them yields a `PROVIDER_ERROR`.
pub fn build_registry(catalog: &Arc<ChainCatalog>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    let wormhole = ProviderId::new(WormholeAdapter::PROVIDER);
    match catalog.provider(&wormhole) {
        Some(config) if config.enabled => {
            registry.register(Arc::new(WormholeAdapter::new(catalog.clone(), config.clone())));
        }
        Some(_) => info!("Provider {} is disabled", wormhole),
        None => {}
    }

    for id in catalog.provider_ids() {
        if !registry.contains(&id) {
            warn!("No integration available for provider {}", id);
        }
    }

    info!("Registered {} provider adapter(s)", registry.len());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::quote::FeeBreakdown;

    fn quote() -> Quote {
        Quote::success(ProviderId::from("wormhole"), "10", FeeBreakdown::zero(), "5 min")
    }

    #[test]
    fn test_request_validation_order() {
        let empty = TransactionRequest::default();
        let err = empty.quote().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert!(err.message.contains("quote"));

        let no_account = TransactionRequest {
            quote: Some(quote()),
            account: Some("  ".to_string()),
            signer: None,
        };
        assert!(no_account.quote().is_ok());
        assert!(no_account.account().unwrap_err().message.contains("userAddress"));
        assert!(no_account.signer().err().unwrap().message.contains("signer"));
    }

    #[test]
    fn test_registry_keys_by_provider_id() {
        let mut adapter = MockProviderAdapter::new();
        adapter
            .expect_provider_id()
            .return_const(ProviderId::from("rhino"));

        let registry = ProviderRegistry::new().with(Arc::new(adapter));
        assert!(registry.contains(&ProviderId::from("rhino")));
        assert!(registry.get(&ProviderId::from("wormhole")).is_none());
        assert_eq!(registry.ids(), vec![ProviderId::from("rhino")]);
    }
}
