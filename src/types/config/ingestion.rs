//! Tuning knobs for a single ingestion run.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Ingestion window and pagination limits.
///
/// Loaded from an optional JSON file; every field falls back to its default
/// when omitted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IngestionConfig {
    /// How many ledgers behind the chain tip a run starts from.
    #[serde(default = "default_lookback_ledgers")]
    pub lookback_ledgers: u32,

    /// Page size requested from the event feed.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Hard cap on events accumulated by one fetch.
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Number of records returned to the caller after a run.
    #[serde(default = "default_read_back_limit")]
    pub read_back_limit: usize,

    /// Deadline for a whole run, in seconds. Bounds the page walk as a
    /// whole; each RPC call also has its own timeout.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_lookback_ledgers() -> u32 {
    10_000
}

fn default_page_limit() -> u32 {
    100
}

fn default_max_events() -> usize {
    5_000
}

fn default_read_back_limit() -> usize {
    50
}

fn default_run_timeout_secs() -> u64 {
    300
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            lookback_ledgers: default_lookback_ledgers(),
            page_limit: default_page_limit(),
            max_events: default_max_events(),
            read_back_limit: default_read_back_limit(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl IngestionConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Reads the config file if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(
                "No ingestion config at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ingestion config at {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ingestion config at {}", path.display()))?;

        anyhow::ensure!(config.page_limit > 0, "page_limit must be positive");
        anyhow::ensure!(config.max_events > 0, "max_events must be positive");
        anyhow::ensure!(config.read_back_limit > 0, "read_back_limit must be positive");
        anyhow::ensure!(config.run_timeout_secs > 0, "run_timeout_secs must be positive");

        Ok(config)
    }
}
