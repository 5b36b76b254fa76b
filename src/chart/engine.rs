// =============================================================================
// Chart Engine — per-market synthetic candle feed
// =============================================================================
//
// One engine per configured market. The engine owns the market's bounded
// candle series and the last generated price behind a single RwLock; the
// spawned chart loop is the only writer, readers clone snapshots.
//
// Lifecycle:
//   1. `seed` replays one simulated price step per elapsed second across the
//      look-back window so the series is fully populated before the first
//      live tick.
//   2. `run_chart_loop` fires once per tick interval, advancing the price
//      process one step and folding the sample into the series.
//   3. A watch-channel shutdown signal terminates the loop deterministically;
//      no further steps mutate the series after it fires.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::app_state::AppState;
use crate::chart::price_process::{PricePoint, PriceProcess};
use crate::chart::series::{Candle, CandleSeries};
use crate::runtime_config::ChartParams;

// ---------------------------------------------------------------------------
// Snapshot type
// ---------------------------------------------------------------------------

/// Read-only per-market view handed to the rendering layer, re-emitted on
/// every state change.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub series_id: String,
    pub candles: Vec<Candle>,
}

// ---------------------------------------------------------------------------
// ChartEngine
// ---------------------------------------------------------------------------

struct ChartState {
    series: CandleSeries,
    /// Price the next step evolves from when the series is empty. Kept in
    /// sync with the last generated sample.
    last_price: f64,
}

/// Owns one market's candle series and price process. All parameters are
/// fixed at construction.
pub struct ChartEngine {
    series_id: String,
    process: PriceProcess,
    bucket_ms: i64,
    window_bars: usize,
    tick_ms: u64,
    lookback_secs: u64,
    state: RwLock<ChartState>,
}

impl ChartEngine {
    /// Build an unseeded engine for `base`/`quote` from the chart parameters.
    pub fn new(base: &str, quote: &str, params: &ChartParams) -> Self {
        let process = PriceProcess {
            anchor: params.anchor_price,
            reversion: params.reversion,
            vol_pct: params.vol_pct,
            dt_secs: params.tick_ms as f64 / 1000.0,
            floor: params.floor_price,
        };

        Self {
            series_id: format!("{base}/{quote}"),
            process,
            bucket_ms: params.bucket_ms,
            window_bars: params.window_bars,
            tick_ms: params.tick_ms,
            lookback_secs: params.lookback_secs,
            state: RwLock::new(ChartState {
                series: CandleSeries::new(params.bucket_ms, params.window_bars),
                last_price: params.anchor_price,
            }),
        }
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    /// Warm-start: replay one simulated second at a time across the
    /// look-back window, then fold the replayed ticks through the bulk
    /// aggregation path. The final simulated price seeds the live loop.
    pub fn seed(&self, now_ms: i64, rng: &mut impl Rng) {
        let mut price = self.process.anchor;
        let mut ticks = Vec::with_capacity(self.lookback_secs as usize);

        for remaining in (0..self.lookback_secs as i64).rev() {
            price = self.process.next_price(price, rng);
            ticks.push(PricePoint {
                ts_ms: now_ms - remaining * 1_000,
                price,
            });
        }

        let series = CandleSeries::from_ticks(&ticks, self.bucket_ms, self.window_bars);

        let mut state = self.state.write();
        state.series = series;
        state.last_price = price;
    }

    /// Advance the feed one tick: generate the next price from the last
    /// candle's close (or the stored last price when the series is empty) and
    /// fold it into the series at `now_ms`.
    pub fn step(&self, now_ms: i64, rng: &mut impl Rng) {
        let mut state = self.state.write();

        let prev = state.series.last_close().unwrap_or(state.last_price);
        let next = self.process.next_price(prev, rng);

        state.series.apply_tick(now_ms, next);
        state.last_price = next;

        debug!(series = %self.series_id, price = next, "tick applied");
    }

    /// Clone out the current candles for the rendering layer.
    pub fn snapshot(&self) -> ChartSnapshot {
        ChartSnapshot {
            series_id: self.series_id.clone(),
            candles: self.state.read().series.to_vec(),
        }
    }

    /// Current number of candles in the ring.
    pub fn candle_count(&self) -> usize {
        self.state.read().series.len()
    }

    /// Last generated price.
    pub fn last_price(&self) -> f64 {
        self.state.read().last_price
    }
}

// ---------------------------------------------------------------------------
// Live loop
// ---------------------------------------------------------------------------

/// Drive one engine until the shutdown signal fires.
///
/// A single repeating timer performs one generator step and one incremental
/// aggregation per firing, then bumps the shared state version so the
/// WebSocket feed re-emits the snapshot. The timer exists exactly once per
/// engine; when `shutdown` flips, the loop returns and nothing advances the
/// series afterwards.
pub async fn run_chart_loop(
    engine: Arc<ChartEngine>,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_millis(engine.tick_ms()));
    info!(series = %engine.series_id(), tick_ms = engine.tick_ms(), "chart loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = Utc::now().timestamp_millis();
                engine.step(now_ms, &mut rand::thread_rng());
                state.increment_version();
            }
            _ = shutdown.changed() => {
                info!(series = %engine.series_id(), "chart loop stopped");
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
