//! Configuration management for the bridge engine
//!
//! Loads configuration from TOML files with environment variable substitution,
//! then applies `BRIDGE__SECTION__KEY` environment overrides.

use crate::chain::ChainFamily;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Quote aggregation timings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub debounce_ms: u64,
    pub provider_timeout_ms: u64,
    pub quote_validity_ms: u64,
    pub refresh_threshold_ms: u64,
    pub refresh_check_interval_ms: u64,
    pub auto_refresh: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            provider_timeout_ms: 10_000,
            quote_validity_ms: 30_000,
            refresh_threshold_ms: 10_000,
            refresh_check_interval_ms: 1_000,
            auto_refresh: true,
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn quote_validity(&self) -> Duration {
        Duration::from_millis(self.quote_validity_ms)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_millis(self.refresh_threshold_ms)
    }

    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_check_interval_ms)
    }
}

/// Transaction status polling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub poll_interval_ms: u64,
    pub status_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            status_timeout_secs: 1_800,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub native_token: String,
    pub family: ChainFamily,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    pub explorer_url: Option<String>,
    pub confirmation_blocks: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// chain id -> contract/mint address
    #[serde(default)]
    pub addresses: HashMap<String, String>,
    pub price_usd: Option<Decimal>,
}

/// Per-provider integration parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub tokens: Vec<String>,
    /// Bridge fee in basis points of the gross output
    pub bridge_fee_bps: u32,
    /// Fixed gas fee in USD
    pub gas_fee_usd: Decimal,
    /// Variable gas fee in USD per unit of source amount
    pub gas_fee_rate: Decimal,
    pub estimated_time: String,
    pub route_label: Option<String>,
    pub contract_address: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tokens: Vec::new(),
            bridge_fee_bps: 0,
            gas_fee_usd: Decimal::ZERO,
            gas_fee_rate: Decimal::ZERO,
            estimated_time: "N/A".to_string(),
            route_label: None,
            contract_address: None,
        }
    }
}

impl ProviderConfig {
    pub fn supports_token(&self, symbol: &str) -> bool {
        self.tokens.iter().any(|t| t == symbol)
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings = Config::builder()
            .add_source(File::from_str(&config_str, FileFormat::Toml))
            .add_source(Environment::with_prefix("BRIDGE").separator("__"))
            .build()
            .with_context(|| "Failed to parse configuration")?
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            anyhow::bail!("At least one chain must be configured");
        }

        for (id, chain) in &self.chains {
            for provider in &chain.providers {
                if !self.providers.contains_key(provider) {
                    anyhow::bail!("Chain {} references unknown provider {}", id, provider);
                }
            }
            if chain.family == ChainFamily::Evm && chain.rpc_urls.is_empty() {
                tracing::warn!("Chain {} has no RPC URLs - status lookups will fail", id);
            }
        }

        for token in &self.tokens {
            for chain in token.addresses.keys() {
                if !self.chains.contains_key(chain) {
                    anyhow::bail!(
                        "Token {} has an address on unknown chain {}",
                        token.symbol,
                        chain
                    );
                }
            }
        }

        for (id, provider) in &self.providers {
            if provider.bridge_fee_bps > 10_000 {
                anyhow::bail!("Provider {} bridge fee exceeds 100%", id);
            }
        }

        if self.engine.quote_validity_ms == 0 || self.engine.provider_timeout_ms == 0 {
            anyhow::bail!("Quote validity and provider timeout must be non-zero");
        }
        if self.engine.refresh_check_interval_ms == 0 {
            anyhow::bail!("Refresh check interval must be non-zero");
        }
        if self.orchestrator.poll_interval_ms == 0 {
            anyhow::bail!("Status poll interval must be non-zero");
        }

        Ok(())
    }

    /// Chains ordered by id
    pub fn chain_ids(&self) -> Vec<&String> {
        let mut ids: Vec<_> = self.chains.keys().collect();
        ids.sort();
        ids
    }
}

lazy_static::lazy_static! {
    static ref ENV_VAR: regex::Regex =
        regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
