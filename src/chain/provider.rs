//! EVM RPC client with multi-RPC support and automatic failover

use super::finality::resolve_status;
use super::Chain;
use crate::error::{BridgeError, BridgeResult};
use crate::tx::TransactionStatus;

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Status lookups against an EVM chain, failing over between RPC URLs
pub struct EvmStatusClient {
    chain_id: String,
    confirmation_blocks: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EvmStatusClient {
    /// Create a client for a chain's configured RPC URLs
    pub fn new(chain: &Chain) -> BridgeResult<Self> {
        let mut http_providers = Vec::new();

        for url in chain.rpc_urls.iter().filter(|u| !u.trim().is_empty()) {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", chain.id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BridgeError::network_error(
                format!("no valid RPC providers for chain {}", chain.id),
                None,
            ));
        }

        Ok(Self {
            chain_id: chain.id.clone(),
            confirmation_blocks: chain.confirmation_blocks,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> BridgeResult<u64> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.chain_id, e
                    );
                    last_error = Some(e);
                    self.failover();
                }
            }
        }

        Err(BridgeError::network_error(
            format!(
                "all providers failed for chain {}: {}",
                self.chain_id,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
            None,
        ))
    }

    /// Get transaction receipt with failover
    async fn get_receipt(&self, tx_hash: H256) -> BridgeResult<Option<TransactionReceipt>> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match self.http().get_transaction_receipt(tx_hash).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    warn!("Failed to get receipt from chain {}: {}", self.chain_id, e);
                    last_error = Some(e);
                    self.failover();
                }
            }
        }

        Err(last_error
            .map(BridgeError::from)
            .unwrap_or_else(|| BridgeError::network_error("receipt lookup failed", None)))
    }

    /// Resolve the status of a transaction hash
    pub async fn transaction_status(&self, hash: &str) -> BridgeResult<TransactionStatus> {
        let tx_hash = H256::from_str(hash)
            .map_err(|_| BridgeError::validation_error("hash", "not a 32-byte hex hash"))?;

        let receipt = self.get_receipt(tx_hash).await?;
        let current_block = self.get_block_number().await?;

        let block = match receipt.as_ref().and_then(|r| r.block_number) {
            Some(number) => self.http().get_block(number).await.unwrap_or_else(|e| {
                debug!("Block {} lookup failed on {}: {}", number, self.chain_id, e);
                None
            }),
            None => None,
        };

        Ok(resolve_status(
            hash,
            receipt.as_ref(),
            current_block,
            self.confirmation_blocks,
            block.as_ref(),
        ))
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }
}
