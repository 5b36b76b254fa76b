// =============================================================================
// Central Application State — Flowpulse Market Feed
// =============================================================================
//
// The single source of truth for the feed process. Each market's chart engine
// manages its own interior mutability; AppState ties them together and
// provides a unified snapshot for the dashboard API and WebSocket feed.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for mutable shared collections.
//   - Arc wrappers for the per-market engines.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::chart::{ChartEngine, ChartSnapshot};
use crate::runtime_config::RuntimeConfig;

// =============================================================================
// AppState
// =============================================================================

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Monotonically increasing version counter. Incremented on every
    /// meaningful state mutation (one per chart tick). The WebSocket feed
    /// uses this to detect changes and push updates.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Chart engines ───────────────────────────────────────────────────
    /// One engine per configured market, keyed by base symbol.
    chart_engines: RwLock<HashMap<String, Arc<ChartEngine>>>,

    // ── Operational status ──────────────────────────────────────────────
    pub ws_client_connected: RwLock<bool>,
    pub last_ws_client_event: RwLock<std::time::Instant>,

    // ── Timing ──────────────────────────────────────────────────────────
    /// Instant when the feed was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` from the given runtime configuration.
    ///
    /// An unseeded chart engine is pre-created for every configured market;
    /// main seeds each one before its loop starts. The returned value is
    /// typically wrapped in `Arc` immediately.
    pub fn new(config: RuntimeConfig) -> Self {
        let mut chart_engines = HashMap::new();
        for market in &config.markets {
            chart_engines.insert(
                market.clone(),
                Arc::new(ChartEngine::new(market, &config.quote_symbol, &config.chart)),
            );
        }

        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),

            runtime_config: Arc::new(RwLock::new(config)),
            chart_engines: RwLock::new(chart_engines),

            ws_client_connected: RwLock::new(false),
            last_ws_client_event: RwLock::new(std::time::Instant::now()),

            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Atomically increment the state version. Called after every chart tick
    /// to signal WebSocket clients that fresh data is available.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the current state version without modifying it.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Engine access ───────────────────────────────────────────────────

    /// Engine for a single market, if configured.
    pub fn chart_engine(&self, market: &str) -> Option<Arc<ChartEngine>> {
        self.chart_engines.read().get(market).cloned()
    }

    /// All engines, keyed by market symbol.
    pub fn all_chart_engines(&self) -> Vec<(String, Arc<ChartEngine>)> {
        self.chart_engines
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Build a complete, serialisable snapshot of the feed state.
    ///
    /// This is the payload sent to the dashboard via the REST
    /// `GET /api/v1/state` endpoint and the WebSocket push feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let now = Utc::now();
        let config = self.runtime_config.read();
        let version = self.current_state_version();

        let ws_client_event_age_ms = self
            .last_ws_client_event
            .read()
            .elapsed()
            .as_millis() as u64;

        let feed = FeedStatus {
            ws_client_connected: *self.ws_client_connected.read(),
            last_ws_client_event_age_ms: ws_client_event_age_ms,
            state_version: version,
            ws_sequence_number: self.ws_sequence_number.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
            server_time: now.timestamp_millis(),
        };

        let runtime_config = RuntimeConfigSummary {
            markets: config.markets.clone(),
            quote_symbol: config.quote_symbol.clone(),
            bucket_ms: config.chart.bucket_ms,
            window_bars: config.chart.window_bars,
            tick_ms: config.chart.tick_ms,
        };

        let charts = self
            .chart_engines
            .read()
            .iter()
            .map(|(market, engine)| (market.clone(), engine.snapshot()))
            .collect();

        StateSnapshot {
            state_version: version,
            server_time: now.timestamp_millis(),
            feed,
            runtime_config,
            charts,
        }
    }
}

// =============================================================================
// Serialisable snapshot types (match the dashboard's StateSnapshot interface)
// =============================================================================

/// Full feed snapshot sent to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub feed: FeedStatus,
    pub runtime_config: RuntimeConfigSummary,
    /// One chart snapshot per market, keyed by base symbol.
    pub charts: HashMap<String, ChartSnapshot>,
}

/// Operational status header — the dashboard's primary status banner.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub ws_client_connected: bool,
    pub last_ws_client_event_age_ms: u64,
    pub state_version: u64,
    pub ws_sequence_number: u64,
    pub uptime_secs: u64,
    pub server_time: i64,
}

/// Summary of runtime config for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfigSummary {
    pub markets: Vec<String>,
    pub quote_symbol: String,
    pub bucket_ms: i64,
    pub window_bars: usize,
    pub tick_ms: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_one_engine_per_market() {
        let state = AppState::new(RuntimeConfig::default());
        assert_eq!(state.all_chart_engines().len(), 5);
        assert!(state.chart_engine("SOLO").is_some());
        assert!(state.chart_engine("DOGE").is_none());
    }

    #[test]
    fn version_counter_increments() {
        let state = AppState::new(RuntimeConfig::default());
        let before = state.current_state_version();
        state.increment_version();
        assert_eq!(state.current_state_version(), before + 1);
    }

    #[test]
    fn snapshot_contains_all_markets() {
        let state = AppState::new(RuntimeConfig::default());
        let snap = state.build_snapshot();
        assert_eq!(snap.charts.len(), 5);
        assert_eq!(snap.runtime_config.bucket_ms, 3_000);
        assert_eq!(
            snap.charts.get("SOLO").map(|c| c.series_id.as_str()),
            Some("SOLO/XRP")
        );
        // Engines are unseeded until main runs the warm-start.
        assert!(snap.charts.values().all(|c| c.candles.is_empty()));
    }

    #[test]
    fn snapshot_serialises_to_json() {
        let state = AppState::new(RuntimeConfig::default());
        let json = serde_json::to_string(&state.build_snapshot()).unwrap();
        assert!(json.contains("\"state_version\""));
        assert!(json.contains("\"charts\""));
        assert!(json.contains("SOLO/XRP"));
    }
}
