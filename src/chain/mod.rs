//! Chain module - static chain, token and provider catalog
//!
//! This module provides:
//! - The immutable catalog of chains, tokens and bridge providers
//! - Route eligibility resolution
//! - EVM RPC access with failover for transaction status lookups
//! - Chain-specific confirmation depth

pub mod finality;
pub mod provider;
pub mod route;

pub use finality::{recommended_confirmations, resolve_status};
pub use provider::EvmStatusClient;
pub use route::{Route, RouteResolver};

use crate::config::{ProviderConfig, Settings};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity of a bridge provider (e.g. `wormhole`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Chain family, decides how transactions are signed and tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
    Substrate,
}

/// A supported chain
#[derive(Debug, Clone, Serialize)]
pub struct Chain {
    pub id: String,
    pub name: String,
    pub native_token: String,
    pub family: ChainFamily,
    /// Providers in preference order
    pub providers: Vec<ProviderId>,
    pub rpc_urls: Vec<String>,
    pub explorer_url: Option<String>,
    pub confirmation_blocks: u64,
}

impl Chain {
    pub fn supports(&self, provider: &ProviderId) -> bool {
        self.providers.contains(provider)
    }
}

/// A supported token
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// chain id -> contract/mint address
    pub addresses: HashMap<String, String>,
    pub price_usd: Option<rust_decimal::Decimal>,
}

impl Token {
    pub fn address_on(&self, chain_id: &str) -> Option<&str> {
        self.addresses.get(chain_id).map(|a| a.as_str())
    }

    pub fn is_available_on(&self, chain_id: &str) -> bool {
        self.addresses.contains_key(chain_id)
    }
}

/// Immutable catalog of chains, tokens and provider configurations
#[derive(Debug, Clone, Default)]
pub struct ChainCatalog {
    chains: HashMap<String, Chain>,
    tokens: HashMap<String, Token>,
    providers: HashMap<ProviderId, ProviderConfig>,
}

impl ChainCatalog {
    /// Build a catalog from explicit records
    pub fn new(
        chains: Vec<Chain>,
        tokens: Vec<Token>,
        providers: Vec<(ProviderId, ProviderConfig)>,
    ) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.id.clone(), c)).collect(),
            tokens: tokens.into_iter().map(|t| (t.symbol.clone(), t)).collect(),
            providers: providers.into_iter().collect(),
        }
    }

    /// Build the catalog from loaded settings
    pub fn from_settings(settings: &Settings) -> Arc<Self> {
        let chains = settings
            .chains
            .iter()
            .map(|(id, c)| Chain {
                id: id.clone(),
                name: c.name.clone(),
                native_token: c.native_token.clone(),
                family: c.family,
                providers: c.providers.iter().map(|p| ProviderId::new(p.as_str())).collect(),
                rpc_urls: c.rpc_urls.clone(),
                explorer_url: c.explorer_url.clone(),
                confirmation_blocks: c
                    .confirmation_blocks
                    .unwrap_or_else(|| recommended_confirmations(id)),
            })
            .collect();

        let tokens = settings
            .tokens
            .iter()
            .map(|t| Token {
                symbol: t.symbol.clone(),
                name: t.name.clone(),
                decimals: t.decimals,
                addresses: t.addresses.clone(),
                price_usd: t.price_usd,
            })
            .collect();

        let providers = settings
            .providers
            .iter()
            .map(|(id, p)| (ProviderId::new(id.as_str()), p.clone()))
            .collect();

        let catalog = Self::new(chains, tokens, providers);
        debug!(
            "Catalog loaded: {} chains, {} tokens, {} providers",
            catalog.chains.len(),
            catalog.tokens.len(),
            catalog.providers.len()
        );

        for (id, chain) in &catalog.chains {
            for provider in &chain.providers {
                if !catalog.providers.contains_key(provider) {
                    warn!("Chain {} lists unknown provider {}", id, provider);
                }
            }
        }

        Arc::new(catalog)
    }

    pub fn chain(&self, id: &str) -> Option<&Chain> {
        self.chains.get(id)
    }

    pub fn token(&self, symbol: &str) -> Option<&Token> {
        self.tokens.get(symbol)
    }

    pub fn provider(&self, id: &ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id)
    }

    /// All chains ordered by id
    pub fn chains(&self) -> Vec<&Chain> {
        let mut chains: Vec<_> = self.chains.values().collect();
        chains.sort_by(|a, b| a.id.cmp(&b.id));
        chains
    }

    /// All provider ids ordered by id
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Tokens available on a chain, ordered by symbol
    pub fn tokens_for_chain(&self, chain_id: &str) -> Vec<&Token> {
        let mut tokens: Vec<_> = self
            .tokens
            .values()
            .filter(|t| t.is_available_on(chain_id))
            .collect();
        tokens.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tokens
    }
}
