// =============================================================================
// Runtime Configuration — feed settings with atomic save
// =============================================================================
//
// Central configuration for the Flowpulse feed: which markets to simulate and
// the fixed chart parameters every engine is built from. Parameters are read
// once at startup; there is no mid-run reconfiguration.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_markets() -> Vec<String> {
    vec![
        "SOLO".to_string(),
        "CSC".to_string(),
        "XPM".to_string(),
        "ELS".to_string(),
        "VGB".to_string(),
    ]
}

fn default_quote_symbol() -> String {
    "XRP".to_string()
}

fn default_bucket_ms() -> i64 {
    3_000
}

fn default_window_bars() -> usize {
    20
}

fn default_tick_ms() -> u64 {
    1_000
}

fn default_anchor_price() -> f64 {
    10.0
}

fn default_reversion() -> f64 {
    0.18
}

fn default_vol_pct() -> f64 {
    0.006
}

fn default_floor_price() -> f64 {
    0.01
}

fn default_lookback_secs() -> u64 {
    60
}

// =============================================================================
// ChartParams
// =============================================================================

/// Fixed parameters of one synthetic chart: bucket geometry plus the
/// mean-reverting price process. Applied identically to every market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartParams {
    /// Candle bucket width in milliseconds.
    #[serde(default = "default_bucket_ms")]
    pub bucket_ms: i64,

    /// Maximum number of candles kept in the sliding window.
    #[serde(default = "default_window_bars")]
    pub window_bars: usize,

    /// Interval between generated price samples in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Price the process mean-reverts toward.
    #[serde(default = "default_anchor_price")]
    pub anchor_price: f64,

    /// Reversion strength per unit time (0 < k < 1).
    #[serde(default = "default_reversion")]
    pub reversion: f64,

    /// Relative volatility of the per-tick shock.
    #[serde(default = "default_vol_pct")]
    pub vol_pct: f64,

    /// Hard lower bound on every generated price.
    #[serde(default = "default_floor_price")]
    pub floor_price: f64,

    /// Warm-start look-back window in seconds (one replayed sample per
    /// second).
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
}

impl Default for ChartParams {
    fn default() -> Self {
        Self {
            bucket_ms: default_bucket_ms(),
            window_bars: default_window_bars(),
            tick_ms: default_tick_ms(),
            anchor_price: default_anchor_price(),
            reversion: default_reversion(),
            vol_pct: default_vol_pct(),
            floor_price: default_floor_price(),
            lookback_secs: default_lookback_secs(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the Flowpulse feed.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Token symbols to run a synthetic chart for.
    #[serde(default = "default_markets")]
    pub markets: Vec<String>,

    /// Quote side of every series id (e.g. `SOLO/XRP`).
    #[serde(default = "default_quote_symbol")]
    pub quote_symbol: String,

    /// Chart geometry and price-process parameters.
    #[serde(default)]
    pub chart: ChartParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            markets: default_markets(),
            quote_symbol: default_quote_symbol(),
            chart: ChartParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            markets = ?config.markets,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.markets.len(), 5);
        assert_eq!(cfg.markets[0], "SOLO");
        assert_eq!(cfg.quote_symbol, "XRP");
        assert_eq!(cfg.chart.bucket_ms, 3_000);
        assert_eq!(cfg.chart.window_bars, 20);
        assert_eq!(cfg.chart.tick_ms, 1_000);
        assert!((cfg.chart.anchor_price - 10.0).abs() < f64::EPSILON);
        assert!((cfg.chart.reversion - 0.18).abs() < f64::EPSILON);
        assert!((cfg.chart.vol_pct - 0.006).abs() < f64::EPSILON);
        assert!((cfg.chart.floor_price - 0.01).abs() < f64::EPSILON);
        assert_eq!(cfg.chart.lookback_secs, 60);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.markets.len(), 5);
        assert_eq!(cfg.quote_symbol, "XRP");
        assert_eq!(cfg.chart.bucket_ms, 3_000);
        assert_eq!(cfg.chart.window_bars, 20);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "markets": ["SOLO"], "chart": { "window_bars": 40 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.markets, vec!["SOLO"]);
        assert_eq!(cfg.chart.window_bars, 40);
        assert_eq!(cfg.chart.bucket_ms, 3_000);
        assert_eq!(cfg.quote_symbol, "XRP");
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.markets, cfg2.markets);
        assert_eq!(cfg.quote_symbol, cfg2.quote_symbol);
        assert_eq!(cfg.chart.bucket_ms, cfg2.chart.bucket_ms);
        assert_eq!(cfg.chart.window_bars, cfg2.chart.window_bars);
    }
}
