//! Confirmation depth and receipt interpretation for source chains
//!
//! Different chains have different finality models:
//! - Ethereum: Probabilistic (32 blocks for practical finality, ~6 min)
//! - Polygon: Probabilistic (128 blocks)
//! - Arbitrum / Optimism / Base: soft finality after L1 inclusion
//! - Moonbeam: deterministic finality after a couple of blocks
//! - Avalanche: Instant finality (1 block)

use crate::tx::{TransactionStatus, TxState};

use ethers::types::{Block, TransactionReceipt, H256};
use tracing::debug;

/// Get recommended confirmation blocks for a chain id
pub fn recommended_confirmations(chain_id: &str) -> u64 {
    match chain_id {
        "ethereum" => 32,
        "sepolia" | "goerli" => 12,
        "polygon" => 128,
        "arbitrum" | "optimism" | "base" => 64,
        "moonbeam" | "moonriver" => 2,
        "avalanche" => 1,
        // Default conservative
        _ => 64,
    }
}

/// Turn a receipt lookup into a status.
///
/// No receipt yet means the transaction is still pending. A receipt with a
/// zero status is a revert. Otherwise the transaction is confirmed once it
/// is `required` blocks deep.
pub fn resolve_status(
    hash: &str,
    receipt: Option<&TransactionReceipt>,
    current_block: u64,
    required: u64,
    block: Option<&Block<H256>>,
) -> TransactionStatus {
    let Some(receipt) = receipt else {
        return TransactionStatus::pending(hash);
    };

    let block_number = receipt.block_number.map(|b| b.as_u64());
    let confirmations = block_number
        .map(|b| current_block.saturating_sub(b) + 1)
        .unwrap_or(0);
    let timestamp = block.map(|b| b.timestamp.as_u64() as i64);

    let state = if receipt.status == Some(0u64.into()) {
        TxState::Failed
    } else if block_number.is_some() && confirmations >= required {
        TxState::Confirmed
    } else {
        TxState::Pending
    };

    debug!(
        "Transaction {} has {} / {} confirmations ({:?})",
        hash, confirmations, required, state
    );

    TransactionStatus {
        hash: hash.to_string(),
        state,
        confirmations,
        block_number,
        timestamp,
    }
}
