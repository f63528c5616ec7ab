//! Error taxonomy for the bridge engine
//!
//! Every failure raised by a provider, wallet or network ends up as a
//! [`BridgeError`] with one of a fixed set of kinds. Callers decide what to
//! show (retry button, "add funds", ...) from `(kind, retryable)` alone.

use crate::chain::ProviderId;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fixed classification of every failure the engine can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InsufficientBalance,
    UnsupportedRoute,
    NetworkError,
    WalletError,
    TransactionFailed,
    QuoteExpired,
    InvalidAmount,
    ProviderError,
    ValidationError,
}

impl ErrorKind {
    /// Default retryability for the kind
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError | ErrorKind::QuoteExpired | ErrorKind::ProviderError
        )
    }

    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::UnsupportedRoute => "unsupported_route",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::WalletError => "wallet_error",
            ErrorKind::TransactionFailed => "transaction_failed",
            ErrorKind::QuoteExpired => "quote_expired",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::ValidationError => "validation_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Corrective action offered to the user for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserAction {
    Retry,
    AddFunds,
    ReconnectWallet,
    RefreshQuotes,
    Dismiss,
}

impl UserAction {
    pub fn label(&self) -> &'static str {
        match self {
            UserAction::Retry => "Retry",
            UserAction::AddFunds => "Add Funds",
            UserAction::ReconnectWallet => "Reconnect Wallet",
            UserAction::RefreshQuotes => "Refresh Quotes",
            UserAction::Dismiss => "Dismiss",
        }
    }
}

/// Main error type for the engine
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
    pub provider: Option<ProviderId>,
    pub retryable: bool,
    pub code: Option<String>,
    pub detail: Option<serde_json::Value>,
}

impl BridgeError {
    /// Create an error with the kind's default retryability
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            retryable: kind.is_retryable(),
            code: None,
            detail: None,
        }
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn insufficient_balance(available: &str, required: &str) -> Self {
        Self::new(
            ErrorKind::InsufficientBalance,
            format!(
                "Insufficient balance. Required: {}, Available: {}",
                required, available
            ),
        )
    }

    pub fn unsupported_route(source_chain: &str, destination_chain: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedRoute,
            format!(
                "Bridge route from {} to {} is not supported",
                source_chain, destination_chain
            ),
        )
    }

    pub fn network_error(message: impl fmt::Display, provider: Option<&ProviderId>) -> Self {
        let error = Self::new(ErrorKind::NetworkError, format!("Network error: {}", message));
        match provider {
            Some(provider) => error.with_provider(provider.clone()),
            None => error,
        }
    }

    pub fn wallet_error(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::WalletError, format!("Wallet error: {}", message))
    }

    pub fn transaction_failed(hash: &str, reason: Option<&str>) -> Self {
        let message = match reason {
            Some(reason) => format!("Transaction failed: {}", reason),
            None => "Transaction failed".to_string(),
        };
        Self::new(ErrorKind::TransactionFailed, message)
            .with_detail(serde_json::json!({ "hash": hash }))
    }

    pub fn quote_expired(provider: &ProviderId) -> Self {
        Self::new(ErrorKind::QuoteExpired, "Quote has expired, please refresh")
            .with_provider(provider.clone())
    }

    pub fn invalid_amount(amount: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::InvalidAmount,
            format!("Invalid amount {}: {}", amount, reason),
        )
    }

    pub fn provider_error(provider: &ProviderId, message: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::ProviderError,
            format!("{} error: {}", provider, message),
        )
        .with_provider(provider.clone())
    }

    pub fn validation_error(field: &str, message: &str) -> Self {
        Self::new(
            ErrorKind::ValidationError,
            format!("Validation error for {}: {}", field, message),
        )
    }

    /// Classify an arbitrary failure raised while talking to a provider or wallet.
    ///
    /// A wrapped `BridgeError` keeps its classification. Anything else is
    /// matched on its message; unknown failures are provider errors when the
    /// provider is known and transaction failures otherwise.
    pub fn classify(provider: Option<&ProviderId>, error: &anyhow::Error) -> Self {
        if let Some(bridge_error) = error.downcast_ref::<BridgeError>() {
            return bridge_error.clone();
        }
        if error.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return Self::network_error("request timed out", provider);
        }

        let message = format!("{:#}", error);
        let lower = message.to_lowercase();

        let classified = if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
            Self::new(ErrorKind::InsufficientBalance, message.clone())
        } else if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection")
            || lower.contains("network")
        {
            Self::network_error(&message, None)
        } else if lower.contains("reverted") || lower.contains("nonce too low") {
            Self::new(ErrorKind::TransactionFailed, format!("Transaction failed: {}", message))
        } else if lower.contains("user rejected")
            || lower.contains("rejected by user")
            || lower.contains("user denied")
            || lower.contains("wallet not connected")
            || lower.contains("wallet disconnected")
        {
            Self::wallet_error(&message)
        } else if let Some(provider) = provider {
            Self::provider_error(provider, &message)
        } else {
            Self::new(ErrorKind::TransactionFailed, format!("Transaction failed: {}", message))
        };

        match (provider, classified.provider.is_some()) {
            (Some(provider), false) => classified.with_provider(provider.clone()),
            _ => classified,
        }
    }

    /// User-facing explanation derived from the kind only
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::InsufficientBalance => {
                "You don't have enough balance for this transaction. Please check your wallet balance.".to_string()
            }
            ErrorKind::UnsupportedRoute => {
                "This bridge route is not currently supported. Please try a different chain combination.".to_string()
            }
            ErrorKind::NetworkError => {
                "Network connection issue. Please check your internet connection and try again.".to_string()
            }
            ErrorKind::WalletError => {
                "Wallet connection issue. Please reconnect your wallet and try again.".to_string()
            }
            ErrorKind::TransactionFailed => {
                "Transaction failed. Please try again or contact support if the issue persists.".to_string()
            }
            ErrorKind::QuoteExpired => {
                "Quote has expired. Click refresh to get updated quotes.".to_string()
            }
            ErrorKind::InvalidAmount => {
                "Please enter a valid amount within the supported range.".to_string()
            }
            ErrorKind::ProviderError => {
                if self.retryable {
                    "Bridge provider temporarily unavailable. Please try again.".to_string()
                } else {
                    "Bridge provider temporarily unavailable.".to_string()
                }
            }
            ErrorKind::ValidationError => self.message.clone(),
        }
    }

    /// Corrective action for the error.
    ///
    /// An expired quote can never succeed on retry, so it always asks for a
    /// quote refresh even though the kind is retryable.
    pub fn action(&self) -> UserAction {
        match self.kind {
            ErrorKind::QuoteExpired => UserAction::RefreshQuotes,
            _ if self.retryable => UserAction::Retry,
            ErrorKind::InsufficientBalance => UserAction::AddFunds,
            ErrorKind::WalletError => UserAction::ReconnectWallet,
            _ => UserAction::Dismiss,
        }
    }
}

impl From<tokio::time::error::Elapsed> for BridgeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        BridgeError::network_error("request timed out", None)
    }
}

impl From<rust_decimal::Error> for BridgeError {
    fn from(e: rust_decimal::Error) -> Self {
        BridgeError::new(ErrorKind::InvalidAmount, format!("Invalid amount: {}", e))
    }
}

impl From<ethers::providers::ProviderError> for BridgeError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        BridgeError::network_error(e, None)
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::new(
            ErrorKind::ProviderError,
            format!("Malformed provider data: {}", e),
        )
    }
}

/// Result type for engine operations
pub type BridgeResult<T> = Result<T, BridgeError>;
