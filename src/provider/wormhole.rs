//! Wormhole token bridge adapter
//!
//! Quotes from a fee model over the catalog's token prices, submits through
//! the caller's wallet and tracks transfers on EVM source chains.

use super::{ProviderAdapter, TransactionRequest, UnsignedTransfer};
use crate::chain::{ChainCatalog, ChainFamily, EvmStatusClient, ProviderId, Route};
use crate::config::ProviderConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::quote::{FeeBreakdown, Quote};
use crate::tx::{FeeEstimator, TransactionStatus};

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transfer parameters carried in a quote's provider data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferData {
    source_chain: String,
    destination_chain: String,
    source_token: String,
    destination_token: String,
    amount: String,
    source_token_address: Option<String>,
    destination_token_address: Option<String>,
    exchange_rate: String,
}

pub struct WormholeAdapter {
    id: ProviderId,
    catalog: Arc<ChainCatalog>,
    config: ProviderConfig,
    fees: FeeEstimator,
    /// Status clients for EVM chains served by this provider
    status_clients: HashMap<String, EvmStatusClient>,
}

impl WormholeAdapter {
    pub const PROVIDER: &'static str = "wormhole";

    pub fn new(catalog: Arc<ChainCatalog>, config: ProviderConfig) -> Self {
        let id = ProviderId::new(Self::PROVIDER);
        let mut status_clients = HashMap::new();

        for chain in catalog.chains() {
            if chain.family != ChainFamily::Evm || !chain.supports(&id) {
                continue;
            }
            match EvmStatusClient::new(chain) {
                Ok(client) => {
                    status_clients.insert(chain.id.clone(), client);
                }
                Err(e) => warn!("No status tracking for {} on {}: {}", id, chain.id, e),
            }
        }

        let fees = FeeEstimator::new(config.gas_fee_usd, config.gas_fee_rate);
        Self {
            id,
            catalog,
            config,
            fees,
            status_clients,
        }
    }

    fn bridge_fee_rate(&self) -> Decimal {
        Decimal::from(self.config.bridge_fee_bps) / Decimal::from(10_000)
    }

    fn price(&self, symbol: &str) -> BridgeResult<Decimal> {
        self.catalog
            .token(symbol)
            .and_then(|t| t.price_usd)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| {
                BridgeError::provider_error(&self.id, format!("no reference price for {}", symbol))
                    .with_retryable(false)
            })
    }

    fn decimals(&self, symbol: &str) -> u32 {
        self.catalog
            .token(symbol)
            .map(|t| u32::from(t.decimals))
            .unwrap_or(6)
    }

    /// Fee model quote; errors become a failed quote in `get_quote`
    fn compute_quote(&self, route: &Route) -> BridgeResult<Quote> {
        if !self.config.supports_token(&route.source_token)
            || !self.config.supports_token(&route.destination_token)
        {
            return Err(BridgeError::unsupported_route(
                &route.source_chain,
                &route.destination_chain,
            )
            .with_provider(self.id.clone()));
        }

        let source_price = self.price(&route.source_token)?;
        let destination_price = self.price(&route.destination_token)?;
        let too_large = || {
            BridgeError::invalid_amount(&route.amount.to_string(), "too large to quote")
                .with_provider(self.id.clone())
        };

        let exchange_rate = source_price
            .checked_div(destination_price)
            .ok_or_else(too_large)?;

        let gross = route.amount.checked_mul(exchange_rate).ok_or_else(too_large)?;
        let bridge_fee = gross.checked_mul(self.bridge_fee_rate()).ok_or_else(too_large)?;
        let net = gross
            .checked_sub(bridge_fee)
            .ok_or_else(too_large)?
            .round_dp_with_strategy(
                self.decimals(&route.destination_token),
                RoundingStrategy::ToZero,
            );

        let bridge_fee_usd = bridge_fee
            .checked_mul(destination_price)
            .ok_or_else(too_large)?;
        let gas_fee_usd = self.fees.quote_fee(route.amount).ok_or_else(too_large)?;
        let total = bridge_fee_usd
            .checked_add(gas_fee_usd)
            .ok_or_else(too_large)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        let fees = FeeBreakdown {
            bridge_fee: bridge_fee_usd
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .to_string(),
            gas_fee: gas_fee_usd.to_string(),
            total: total.to_string(),
        };

        let data = TransferData {
            source_chain: route.source_chain.clone(),
            destination_chain: route.destination_chain.clone(),
            source_token: route.source_token.clone(),
            destination_token: route.destination_token.clone(),
            amount: route.amount.to_string(),
            source_token_address: self
                .catalog
                .token(&route.source_token)
                .and_then(|t| t.address_on(&route.source_chain))
                .map(str::to_string),
            destination_token_address: self
                .catalog
                .token(&route.destination_token)
                .and_then(|t| t.address_on(&route.destination_chain))
                .map(str::to_string),
            exchange_rate: exchange_rate.normalize().to_string(),
        };

        debug!(
            "{} quote {} {} -> {} {} (fees ${})",
            self.id, route.amount, route.source_token, net, route.destination_token, fees.total
        );

        Ok(Quote::success(
            self.id.clone(),
            net.normalize().to_string(),
            fees,
            self.config.estimated_time.clone(),
        )
        .with_route_label(
            self.config
                .route_label
                .clone()
                .or_else(|| Some("Wormhole Bridge".to_string())),
        )
        .with_provider_data(serde_json::to_value(&data)?))
    }

    fn transfer_data(&self, quote: &Quote) -> BridgeResult<TransferData> {
        let data = quote.provider_data.clone().ok_or_else(|| {
            BridgeError::validation_error("quote", "Quote carries no transfer data")
        })?;
        Ok(serde_json::from_value(data)?)
    }
}

#[async_trait]
impl ProviderAdapter for WormholeAdapter {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    async fn get_quote(&self, route: &Route) -> Quote {
        match self.compute_quote(route) {
            Ok(quote) => quote,
            Err(e) => {
                warn!("{} quote failed: {}", self.id, e);
                Quote::failed(self.id.clone(), e)
            }
        }
    }

    async fn build_and_submit(&self, request: &TransactionRequest) -> BridgeResult<String> {
        let quote = request.quote()?;
        let from = request.account()?;
        let signer = request.signer()?;
        let data = self.transfer_data(quote)?;

        let chain = self.catalog.chain(&data.source_chain).ok_or_else(|| {
            BridgeError::validation_error(
                "sourceChain",
                &format!("unknown chain {}", data.source_chain),
            )
        })?;

        let transfer = UnsignedTransfer {
            chain_id: chain.id.clone(),
            family: chain.family,
            to: self.config.contract_address.clone(),
            from: from.to_string(),
            amount: data.amount.clone(),
            payload: serde_json::to_value(&data)?,
        };

        info!(
            "Submitting {} transfer of {} {} from {} on {}",
            self.id, data.amount, data.source_token, from, chain.id
        );

        signer
            .sign_and_send(transfer)
            .await
            .map_err(|e| BridgeError::classify(Some(&self.id), &e))
    }

    /// Looks the hash up on every tracked chain; the first chain holding a
    /// receipt answers.
    async fn get_status(&self, hash: &str) -> BridgeResult<TransactionStatus> {
        if self.status_clients.is_empty() {
            return Err(BridgeError::provider_error(
                &self.id,
                "status tracking not available for this provider's chains",
            ));
        }

        let mut last_error = None;
        let mut seen_pending = false;
        for client in self.status_clients.values() {
            match client.transaction_status(hash).await {
                Ok(status) if status.block_number.is_some() || status.is_terminal() => {
                    return Ok(status);
                }
                Ok(_) => seen_pending = true,
                Err(e) => {
                    debug!("Status lookup on {} failed: {}", client.chain_id(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !seen_pending => Err(e.with_provider(self.id.clone())),
            _ => Ok(TransactionStatus::pending(hash)),
        }
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> BridgeResult<String> {
        let quote = request.quote()?;
        let data = self.transfer_data(quote)?;
        let amount = Decimal::from_str(&data.amount)?;
        self.fees
            .estimate(amount)
            .map(|fee| fee.to_string())
            .ok_or_else(|| BridgeError::invalid_amount(&data.amount, "too large to estimate"))
    }
}
