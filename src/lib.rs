//! Bridge Quote Engine - cross-chain quote aggregation and transaction execution
//!
//! Fans quote requests out to every bridge provider serving a route, streams
//! and ranks the results, and drives the selected provider's transaction to
//! a terminal state.

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod provider;
pub mod quote;
pub mod tx;

pub use chain::{ChainCatalog, ProviderId, Route, RouteResolver};
pub use config::Settings;
pub use engine::BridgeEngine;
pub use error::{BridgeError, BridgeResult, ErrorKind, UserAction};
pub use events::{EngineEvent, EventBus};
pub use provider::{ProviderAdapter, ProviderRegistry, TransactionRequest, WalletSigner};
pub use quote::{Quote, QuoteAggregator, QuoteSnapshot, QuoteStream, QuoteUpdate, SortOrder};
pub use tx::{ExecuteOptions, ExecutionState, TransactionHandle, TransactionOrchestrator};
