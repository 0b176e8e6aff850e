//! Application configuration.

use crate::error::{AppError, AppResult};
use quorum_consensus::ConsensusConfig;
use quorum_core::ExecMode;
use quorum_risk::RiskConfig;
use quorum_router::RouterConfig;
use quorum_slot::SlotConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One connected venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue identifier, e.g. "binance".
    pub name: String,
    /// Taker fee, percent of notional.
    #[serde(default)]
    pub fee_pct: Decimal,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Execution mode: shadow, paper, or live.
    #[serde(default)]
    pub mode: ExecMode,
    /// Symbols the engine trades.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Consensus round window in milliseconds.
    #[serde(default = "default_round_window_ms")]
    pub round_window_ms: u64,
    /// How often due rounds are swept, in milliseconds.
    #[serde(default = "default_round_tick_ms")]
    pub round_tick_ms: u64,
    /// Capacity of internal actor channels and the event bus.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Session statistics output interval in seconds.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// Connected venues. In paper mode these become simulated venues.
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    /// Simulated depth per venue quote in paper mode, in quote units.
    #[serde(default = "default_paper_depth")]
    pub paper_depth: Decimal,
    /// Consensus engine configuration.
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// Risk gate configuration.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Slot pool configuration.
    #[serde(default)]
    pub slots: SlotConfig,
    /// Smart order router configuration.
    #[serde(default)]
    pub router: RouterConfig,
}

fn default_round_window_ms() -> u64 {
    5_000
}

fn default_round_tick_ms() -> u64 {
    500
}

fn default_channel_capacity() -> usize {
    256
}

fn default_stats_interval_secs() -> u64 {
    3_600
}

fn default_paper_depth() -> Decimal {
    Decimal::new(10_000, 0)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: ExecMode::default(),
            symbols: Vec::new(),
            round_window_ms: default_round_window_ms(),
            round_tick_ms: default_round_tick_ms(),
            channel_capacity: default_channel_capacity(),
            stats_interval_secs: default_stats_interval_secs(),
            venues: Vec::new(),
            paper_depth: default_paper_depth(),
            consensus: ConsensusConfig::default(),
            risk: RiskConfig::default(),
            slots: SlotConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a file if it exists, otherwise fall back to defaults.
    pub fn load(config_path: &str) -> AppResult<Self> {
        if Path::new(config_path).exists() {
            Self::from_file(config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.mode, ExecMode::Shadow);
        assert_eq!(config.round_window_ms, 5_000);
        assert!(config.symbols.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            mode = "paper"
            symbols = ["BTC/USDT", "ETH/USDT"]
            round_window_ms = 1000

            [[venues]]
            name = "binance"
            fee_pct = "0.1"

            [[venues]]
            name = "kraken"

            [risk]
            max_consecutive_losses = 5

            [router]
            max_slippage_pct = "0.5"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mode, ExecMode::Paper);
        assert_eq!(config.symbols.len(), 2);
        assert_eq!(config.round_window_ms, 1000);
        assert_eq!(config.venues.len(), 2);
        assert_eq!(config.venues[0].fee_pct, dec!(0.1));
        assert_eq!(config.venues[1].fee_pct, Decimal::ZERO);
        assert_eq!(config.risk.max_consecutive_losses, 5);
        assert_eq!(config.router.max_slippage_pct, dec!(0.5));
        // Unspecified sections keep their defaults.
        assert_eq!(config.slots.slot_count, SlotConfig::default().slot_count);
    }
}
