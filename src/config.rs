use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AenError, Result};

/// Specialisation of a node within the fleet.
///
/// The type selects the fitness profile: which metric components dominate
/// when scoring a strategy, so an arbitrage hunter and a volatility sponge
/// disagree about the same embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    ArbitrageHunter,
    VolatilitySponge,
    CorrelationMapper,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::ArbitrageHunter => "arbitrage_hunter",
            NodeType::VolatilitySponge => "volatility_sponge",
            NodeType::CorrelationMapper => "correlation_mapper",
        }
    }

    /// Component weights this node type applies when scoring.
    ///
    /// Weights sum to 1.0 per type; components missing from the market
    /// context contribute zero, they are not renormalized away.
    pub fn fitness_profile(&self) -> BTreeMap<&'static str, f64> {
        let weights: &[(&'static str, f64)] = match self {
            NodeType::ArbitrageHunter => {
                &[("spread_capture", 0.5), ("latency_edge", 0.3), ("volatility", 0.2)]
            }
            NodeType::VolatilitySponge => {
                &[("volatility", 0.6), ("spread_capture", 0.2), ("correlation", 0.2)]
            }
            NodeType::CorrelationMapper => {
                &[("correlation", 0.5), ("volatility", 0.3), ("spread_capture", 0.2)]
            }
        };
        weights.iter().copied().collect()
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated node configuration, immutable for the node's lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier, 3-50 characters
    pub node_id: String,
    pub node_type: NodeType,
    #[serde(default = "default_network_region")]
    pub network_region: String,
    #[serde(default = "default_true")]
    pub enable_market_validation: bool,
    /// Floor between cycle starts, seconds (must be > 0)
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
    /// Conflicting publish retries per cycle before the publish is skipped
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Deadline applied to every external call (store, generator, updater, validator)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// In-memory history cap; older snapshots spill to the persistence sink
    #[serde(default = "default_max_history_entries")]
    pub max_history_entries: usize,
}

fn default_network_region() -> String {
    "us-west-2".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sync_interval() -> u64 {
    30
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_max_history_entries() -> usize {
    10_000
}

impl NodeConfig {
    /// Build a validated config, failing construction on any invalid field.
    pub fn new(node_id: &str, node_type: NodeType) -> Result<Self> {
        let config = Self {
            node_id: node_id.to_string(),
            node_type,
            network_region: default_network_region(),
            enable_market_validation: true,
            sync_interval_seconds: default_sync_interval(),
            max_retry_attempts: default_max_retry_attempts(),
            call_timeout_ms: default_call_timeout_ms(),
            max_history_entries: default_max_history_entries(),
        };
        config.validated()
    }

    /// Load configuration from files and environment.
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory.
    ///
    /// Layering matches the usual scheme: `default.toml`, then the
    /// `AEN_ENV`-named file, then `AEN__`-prefixed environment variables.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("network_region", "us-west-2")?
            .set_default("enable_market_validation", true)?
            .set_default("sync_interval_seconds", 30)?
            .set_default("max_retry_attempts", 3)?
            .set_default("call_timeout_ms", 10_000)?
            .set_default("max_history_entries", 10_000)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AEN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            .add_source(
                Environment::with_prefix("AEN")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize().map_err(AenError::Config)?;
        config.validated()
    }

    fn validated(self) -> Result<Self> {
        match self.validate() {
            Ok(()) => Ok(self),
            Err(errors) => Err(AenError::InvalidConfig(errors.join("; "))),
        }
    }

    /// Validate configuration values, collecting every violation.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.node_id.len() < 3 || self.node_id.len() > 50 {
            errors.push(format!(
                "node_id must be 3-50 characters, got {}",
                self.node_id.len()
            ));
        }

        if self.sync_interval_seconds == 0 {
            errors.push("sync_interval_seconds must be positive".to_string());
        }

        if self.call_timeout_ms == 0 {
            errors.push("call_timeout_ms must be positive".to_string());
        }

        if self.max_history_entries == 0 {
            errors.push("max_history_entries must be positive".to_string());
        }

        if self.network_region.is_empty() {
            errors.push("network_region must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
