//! Engine configuration

use anyhow::{Context, Result};
use common::constants::{DEFAULT_BATCH_SIZE, DEFAULT_QUEUE_CAPACITY, SNAPSHOT_DEPTH};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Input ring capacity; rounded up to a power of two, one slot reserved
    pub queue_capacity: usize,

    /// Messages drained per aggregator iteration
    pub batch_size: usize,

    /// Levels per side in egress snapshots
    pub snapshot_depth: usize,

    /// Books idle longer than this are evicted (seconds)
    pub eviction_age_secs: u64,

    /// Reject wire frames whose checksum does not match
    pub enforce_checksum: bool,

    /// Seconds between statistics reports
    pub stats_interval_secs: u64,

    /// Simulated feed parameters
    pub simulator: SimulatorConfig,
}

/// Simulated feed parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fraction of generated messages that are trades (rest are quotes)
    pub trade_ratio: f64,

    /// Pause between generation sweeps, in microseconds
    pub pace_micros: u64,

    /// Emit wire frames through the decode path instead of typed messages
    pub wire_format: bool,

    /// Symbols to simulate
    pub symbols: FxHashMap<String, SymbolSeed>,
}

/// Starting conditions for one simulated symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolSeed {
    /// Opening price in display units
    pub start_price: f64,
    /// Annualised volatility of the price walk
    pub volatility: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            snapshot_depth: SNAPSHOT_DEPTH,
            eviction_age_secs: 300,
            enforce_checksum: false,
            stats_interval_secs: 5,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let mut symbols = FxHashMap::default();
        for (name, price, vol) in [
            ("AAPL", 150.25, 0.025),
            ("GOOGL", 2800.50, 0.030),
            ("MSFT", 320.75, 0.022),
            ("TSLA", 800.00, 0.045),
            ("NVDA", 450.30, 0.040),
            ("JPM", 145.80, 0.028),
            ("BAC", 35.60, 0.032),
            ("GS", 380.25, 0.035),
            ("BTCUSD", 45_000.00, 0.08),
            ("ETHUSD", 3_200.00, 0.10),
        ] {
            symbols.insert(
                name.to_string(),
                SymbolSeed {
                    start_price: price,
                    volatility: vol,
                },
            );
        }
        Self {
            trade_ratio: 0.3,
            pace_micros: 10,
            wire_format: false,
            symbols,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_production_shaped() {
        let config = EngineConfig::default();
        assert_eq!(config.queue_capacity, 131_072);
        assert!(config.queue_capacity.is_power_of_two());
        assert_eq!(config.batch_size, 64);
        assert!(!config.enforce_checksum);
        assert_eq!(config.simulator.symbols.len(), 10);
        assert!(config.simulator.symbols.contains_key("AAPL"));
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            queue_capacity = 1024
            enforce_checksum = true

            [simulator]
            trade_ratio = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.enforce_checksum);
        assert!((config.simulator.trade_ratio - 0.5).abs() < f64::EPSILON);
        // Unspecified sections keep their defaults.
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.simulator.symbols.len(), 10);
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = EngineConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.queue_capacity, config.queue_capacity);
        assert_eq!(parsed.simulator.symbols.len(), config.simulator.symbols.len());
    }
}
