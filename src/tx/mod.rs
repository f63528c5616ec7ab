//! Transaction execution module with status polling and fee estimation

mod gas;
mod handle;
mod orchestrator;

pub use gas::FeeEstimator;
pub use handle::{ExecutionState, HandleSnapshot, TransactionHandle};
pub use orchestrator::{ExecuteOptions, TransactionOrchestrator};

use serde::{Deserialize, Serialize};

/// On-chain state of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Pending,
    Confirmed,
    Failed,
}

/// Result of a status lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub hash: String,
    pub state: TxState,
    pub confirmations: u64,
    pub block_number: Option<u64>,
    /// Block timestamp (unix seconds)
    pub timestamp: Option<i64>,
}

impl TransactionStatus {
    /// Status of a transaction not yet included in a block
    pub fn pending(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            state: TxState::Pending,
            confirmations: 0,
            block_number: None,
            timestamp: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state != TxState::Pending
    }
}
