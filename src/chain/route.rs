//! Route value object and provider eligibility resolution

use super::{ChainCatalog, ProviderId};
use crate::error::{BridgeError, BridgeResult};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// A concrete transfer request: chains, tokens and amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub source_chain: String,
    pub destination_chain: String,
    pub source_token: String,
    pub destination_token: String,
    pub amount: Decimal,
}

impl Route {
    /// Build a route, parsing and checking the amount
    pub fn new(
        source_chain: impl Into<String>,
        destination_chain: impl Into<String>,
        source_token: impl Into<String>,
        destination_token: impl Into<String>,
        amount: &str,
    ) -> BridgeResult<Self> {
        let trimmed = amount.trim();
        let parsed = Decimal::from_str(trimmed)
            .map_err(|_| BridgeError::invalid_amount(amount, "not a decimal number"))?;
        if parsed <= Decimal::ZERO {
            return Err(BridgeError::invalid_amount(amount, "must be greater than zero"));
        }

        Ok(Self {
            source_chain: source_chain.into(),
            destination_chain: destination_chain.into(),
            source_token: source_token.into(),
            destination_token: destination_token.into(),
            amount: parsed,
        })
    }
}

/// Resolves which providers can serve a chain/token pair.
///
/// Pure lookups over the catalog. Absence is an empty list or `false`.
#[derive(Debug, Clone)]
pub struct RouteResolver {
    catalog: Arc<ChainCatalog>,
}

impl RouteResolver {
    pub fn new(catalog: Arc<ChainCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<ChainCatalog> {
        &self.catalog
    }

    /// Enabled providers supported by both chains, in source-chain order
    pub fn eligible_providers(&self, source_chain: &str, destination_chain: &str) -> Vec<ProviderId> {
        let (Some(source), Some(destination)) = (
            self.catalog.chain(source_chain),
            self.catalog.chain(destination_chain),
        ) else {
            return Vec::new();
        };

        source
            .providers
            .iter()
            .filter(|p| destination.supports(p))
            .filter(|p| self.catalog.provider(p).map(|c| c.enabled).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Eligible providers whose token list holds both symbols
    pub fn providers_for_tokens(
        &self,
        source_chain: &str,
        destination_chain: &str,
        source_token: &str,
        destination_token: &str,
    ) -> Vec<ProviderId> {
        self.eligible_providers(source_chain, destination_chain)
            .into_iter()
            .filter(|p| match self.catalog.provider(p) {
                Some(config) => {
                    config.supports_token(source_token) && config.supports_token(destination_token)
                }
                None => false,
            })
            .collect()
    }

    pub fn is_route_supported(
        &self,
        source_chain: &str,
        destination_chain: &str,
        source_token: &str,
        destination_token: &str,
    ) -> bool {
        !self
            .providers_for_tokens(source_chain, destination_chain, source_token, destination_token)
            .is_empty()
    }

    pub fn providers_for_route(&self, route: &Route) -> Vec<ProviderId> {
        self.providers_for_tokens(
            &route.source_chain,
            &route.destination_chain,
            &route.source_token,
            &route.destination_token,
        )
    }

    /// Check chains and tokens of a route against the catalog
    pub fn validate(&self, route: &Route) -> BridgeResult<()> {
        // Unknown chains have no eligible providers
        for chain in [&route.source_chain, &route.destination_chain] {
            if self.catalog.chain(chain).is_none() {
                return Err(BridgeError::unsupported_route(
                    &route.source_chain,
                    &route.destination_chain,
                )
                .with_detail(serde_json::json!({ "chain": chain, "reason": "unknown chain" })));
            }
        }
        if route.source_chain == route.destination_chain {
            return Err(BridgeError::validation_error(
                "destinationChain",
                "must differ from the source chain",
            ));
        }

        for (chain, symbol) in [
            (&route.source_chain, &route.source_token),
            (&route.destination_chain, &route.destination_token),
        ] {
            let available = self
                .catalog
                .token(symbol)
                .map(|t| t.is_available_on(chain))
                .unwrap_or(false);
            if !available {
                return Err(BridgeError::unsupported_route(
                    &route.source_chain,
                    &route.destination_chain,
                )
                .with_detail(serde_json::json!({ "chain": chain, "token": symbol })));
            }
        }

        Ok(())
    }
}
