// =============================================================================
// Candle Series — bounded, time-bucketed OHLC aggregation
// =============================================================================
//
// Folds a stream of price samples into fixed-width, time-aligned OHLC bars.
// The series keeps at most `max_bars` candles in a ring; the in-progress
// (most recent) candle is mutated in place as samples arrive within its
// bucket, and older candles are trimmed from the front when a new bucket
// pushes the ring over budget.
//
// Two ingestion paths:
//   * `from_ticks`  — bulk fold of an ascending tick sequence (warm-start).
//   * `apply_tick`  — incremental fold of one live sample.
//
// Both paths maintain open-continuity: every candle after the first opens at
// the previous candle's close, so consecutive bars never show an artificial
// gap. The very first candle opens at its own first price.
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::chart::price_process::PricePoint;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLC candle covering one time bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start in unix milliseconds, always a multiple of the bucket
    /// width.
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

// ---------------------------------------------------------------------------
// CandleSeries — ring of the most recent `max_bars` candles
// ---------------------------------------------------------------------------

/// Ordered, bounded sequence of candles with strictly increasing bucket
/// starts. Owned by a single chart engine; never written concurrently.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    bucket_ms: i64,
    max_bars: usize,
    candles: VecDeque<Candle>,
}

impl CandleSeries {
    /// Create an empty series that retains at most `max_bars` candles of
    /// `bucket_ms`-wide buckets.
    pub fn new(bucket_ms: i64, max_bars: usize) -> Self {
        Self {
            bucket_ms,
            max_bars,
            candles: VecDeque::with_capacity(max_bars + 1),
        }
    }

    /// Bulk path: fold an ascending sequence of ticks into a bounded series.
    ///
    /// Used by the warm-start routine. Deterministic given the same input:
    /// same-bucket ticks tighten high/low and move the close; a tick in a new
    /// bucket opens a candle at the previous tick's price (the running
    /// close), or at its own price when it is the very first tick.
    pub fn from_ticks(ticks: &[PricePoint], bucket_ms: i64, max_bars: usize) -> Self {
        let mut series = Self::new(bucket_ms, max_bars);

        let mut prev_price: Option<f64> = None;
        for tick in ticks {
            let bucket_start = series.bucket_start_for(tick.ts_ms);
            let open_from = prev_price;
            prev_price = Some(tick.price);

            if let Some(last) = series.candles.back_mut() {
                if bucket_start <= last.bucket_start {
                    last.high = last.high.max(tick.price);
                    last.low = last.low.min(tick.price);
                    last.close = tick.price;
                    continue;
                }
            }

            let open = open_from.unwrap_or(tick.price);
            series.candles.push_back(Candle {
                bucket_start,
                open,
                high: open.max(tick.price),
                low: open.min(tick.price),
                close: tick.price,
            });
        }

        // Retain only the most recent `max_bars` candles.
        while series.candles.len() > series.max_bars {
            series.candles.pop_front();
        }

        series
    }

    /// Incremental path: fold one live sample taken at `ts_ms`.
    ///
    /// * Empty series  => a single candle with open = high = low = close.
    /// * Same bucket   => high/low/close update in place; open is immutable.
    /// * New bucket    => a new candle opens at the previous close, then the
    ///   ring is trimmed to `max_bars`.
    ///
    /// A sample whose bucket lands *before* the last candle's bucket (clock
    /// skew) is folded into the last candle rather than creating a duplicate
    /// or out-of-order bucket.
    pub fn apply_tick(&mut self, ts_ms: i64, price: f64) {
        let bucket_start = self.bucket_start_for(ts_ms);

        if let Some(last) = self.candles.back_mut() {
            if bucket_start <= last.bucket_start {
                last.high = last.high.max(price);
                last.low = last.low.min(price);
                last.close = price;
                return;
            }
        }

        // New bucket (or empty series): open at the previous close so the
        // bars stay continuous; the first candle ever opens at its own price.
        let open = match self.candles.back() {
            Some(last) => last.close,
            None => price,
        };

        self.candles.push_back(Candle {
            bucket_start,
            open,
            high: open.max(price),
            low: open.min(price),
            close: price,
        });

        while self.candles.len() > self.max_bars {
            self.candles.pop_front();
        }
    }

    /// Align a timestamp down to the start of its bucket.
    fn bucket_start_for(&self, ts_ms: i64) -> i64 {
        ts_ms.div_euclid(self.bucket_ms) * self.bucket_ms
    }

    /// Close price of the most recent candle, if any.
    pub fn last_close(&self) -> Option<f64> {
        self.candles.back().map(|c| c.close)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Snapshot the current candles oldest-first.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKET_MS: i64 = 3_000;
    const WINDOW: usize = 20;

    fn tick(ts_ms: i64, price: f64) -> PricePoint {
        PricePoint { ts_ms, price }
    }

    /// Every candle must satisfy low <= min(open, close) <= max(open, close) <= high,
    /// buckets must be aligned and strictly increasing, and the ring bounded.
    fn assert_invariants(series: &CandleSeries) {
        let candles = series.to_vec();
        assert!(candles.len() <= WINDOW);
        for c in &candles {
            assert_eq!(c.bucket_start % BUCKET_MS, 0, "unaligned bucket");
            assert!(c.low <= c.open.min(c.close), "low above open/close: {c:?}");
            assert!(c.high >= c.open.max(c.close), "high below open/close: {c:?}");
            assert!(c.low <= c.high);
        }
        for pair in candles.windows(2) {
            assert!(
                pair[0].bucket_start < pair[1].bucket_start,
                "bucket starts not strictly increasing"
            );
        }
    }

    // ---- bulk path --------------------------------------------------------

    #[test]
    fn bulk_empty_input_gives_empty_series() {
        let series = CandleSeries::from_ticks(&[], BUCKET_MS, WINDOW);
        assert!(series.is_empty());
        assert_eq!(series.last_close(), None);
    }

    #[test]
    fn bulk_single_tick_opens_at_own_price() {
        let series = CandleSeries::from_ticks(&[tick(6_500, 10.0)], BUCKET_MS, WINDOW);
        let candles = series.to_vec();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].bucket_start, 6_000);
        assert_eq!(candles[0].open, 10.0);
        assert_eq!(candles[0].high, 10.0);
        assert_eq!(candles[0].low, 10.0);
        assert_eq!(candles[0].close, 10.0);
    }

    #[test]
    fn bulk_open_continuity_across_buckets() {
        // One tick per second for 12 seconds => 4 buckets of 3 ticks.
        let ticks: Vec<PricePoint> = (0..12)
            .map(|i| tick(i * 1_000, 10.0 + i as f64 * 0.1))
            .collect();
        let series = CandleSeries::from_ticks(&ticks, BUCKET_MS, WINDOW);
        let candles = series.to_vec();
        assert_eq!(candles.len(), 4);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].open, pair[0].close, "open != previous close");
        }
        assert_invariants(&series);
    }

    #[test]
    fn bulk_truncates_to_window() {
        // 90 one-second ticks => 30 buckets, trimmed to the last 20.
        let ticks: Vec<PricePoint> = (0..90).map(|i| tick(i * 1_000, 10.0)).collect();
        let series = CandleSeries::from_ticks(&ticks, BUCKET_MS, WINDOW);
        assert_eq!(series.len(), WINDOW);
        let candles = series.to_vec();
        // Oldest surviving bucket is bucket index 10 (30 - 20).
        assert_eq!(candles[0].bucket_start, 10 * BUCKET_MS);
        assert_invariants(&series);
    }

    // ---- incremental path -------------------------------------------------

    #[test]
    fn incremental_empty_series_flat_candle() {
        let mut series = CandleSeries::new(BUCKET_MS, WINDOW);
        series.apply_tick(7_200, 10.5);
        let candles = series.to_vec();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].bucket_start, 6_000);
        assert_eq!(candles[0].open, 10.5);
        assert_eq!(candles[0].high, 10.5);
        assert_eq!(candles[0].low, 10.5);
        assert_eq!(candles[0].close, 10.5);
    }

    #[test]
    fn same_bucket_updates_hlc_only() {
        // Three samples at T, T+500ms, T+1000ms all land in one 3s bucket.
        let mut series = CandleSeries::new(BUCKET_MS, WINDOW);
        series.apply_tick(0, 10.0);
        series.apply_tick(500, 10.5);
        series.apply_tick(1_000, 9.8);

        let candles = series.to_vec();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open, 10.0);
        assert_eq!(candles[0].high, 10.5);
        assert_eq!(candles[0].low, 9.8);
        assert_eq!(candles[0].close, 9.8);
    }

    #[test]
    fn new_bucket_opens_at_previous_close() {
        let mut series = CandleSeries::new(BUCKET_MS, WINDOW);
        series.apply_tick(0, 10.0);
        series.apply_tick(1_000, 10.4);
        series.apply_tick(3_000, 9.9); // next bucket

        let candles = series.to_vec();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].open, candles[0].close);
        assert_eq!(candles[1].open, 10.4);
        assert_eq!(candles[1].high, 10.4);
        assert_eq!(candles[1].low, 9.9);
        assert_eq!(candles[1].close, 9.9);
        assert_invariants(&series);
    }

    #[test]
    fn ring_never_exceeds_window() {
        let mut series = CandleSeries::new(BUCKET_MS, WINDOW);
        for i in 0..100 {
            series.apply_tick(i * BUCKET_MS, 10.0 + (i % 7) as f64 * 0.01);
            assert!(series.len() <= WINDOW, "window exceeded at step {i}");
        }
        assert_eq!(series.len(), WINDOW);
        assert_invariants(&series);
    }

    #[test]
    fn open_continuity_survives_trimming() {
        let mut series = CandleSeries::new(BUCKET_MS, 3);
        for i in 0..10 {
            series.apply_tick(i * BUCKET_MS, 10.0 + i as f64);
        }
        let candles = series.to_vec();
        assert_eq!(candles.len(), 3);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].open, pair[0].close);
        }
    }

    #[test]
    fn within_bucket_idempotent_over_reordering() {
        // Applying [p1, p2, p3] must agree with [p1, p3, p2, p3] on open,
        // high, low; close follows the chronologically last applied sample.
        let apply = |prices: &[f64]| {
            let mut s = CandleSeries::new(BUCKET_MS, WINDOW);
            for (i, p) in prices.iter().enumerate() {
                s.apply_tick(i as i64 * 100, *p);
            }
            s.to_vec()[0]
        };

        let a = apply(&[10.0, 10.5, 9.8]);
        let b = apply(&[10.0, 9.8, 10.5, 9.8]);

        assert_eq!(a.open, b.open);
        assert_eq!(a.high, b.high);
        assert_eq!(a.low, b.low);
        assert_eq!(a.close, b.close);
        assert_eq!(a.close, 9.8);
    }

    #[test]
    fn clock_skew_folds_into_last_bucket() {
        let mut series = CandleSeries::new(BUCKET_MS, WINDOW);
        series.apply_tick(0, 10.0);
        series.apply_tick(3_000, 10.2);
        // A sample from an earlier bucket must not create a new candle.
        series.apply_tick(1_500, 11.0);

        let candles = series.to_vec();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].high, 11.0);
        assert_eq!(candles[1].close, 11.0);
        assert_invariants(&series);
    }

    #[test]
    fn multi_bucket_gap_is_skipped_not_backfilled() {
        let mut series = CandleSeries::new(BUCKET_MS, WINDOW);
        series.apply_tick(0, 10.0);
        series.apply_tick(5 * BUCKET_MS, 10.3);

        let candles = series.to_vec();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].bucket_start, 5 * BUCKET_MS);
        assert_eq!(candles[1].open, 10.0);
    }

    #[test]
    fn bulk_and_incremental_agree() {
        let ticks: Vec<PricePoint> = (0..30)
            .map(|i| tick(i * 1_000, 10.0 + ((i * 13) % 7) as f64 * 0.05))
            .collect();

        let bulk = CandleSeries::from_ticks(&ticks, BUCKET_MS, WINDOW);

        let mut inc = CandleSeries::new(BUCKET_MS, WINDOW);
        for t in &ticks {
            inc.apply_tick(t.ts_ms, t.price);
        }

        let a = bulk.to_vec();
        let b = inc.to_vec();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.bucket_start, y.bucket_start);
            assert_eq!(x.open, y.open);
            assert_eq!(x.high, y.high);
            assert_eq!(x.low, y.low);
            assert_eq!(x.close, y.close);
        }
    }
}
