// =============================================================================
// Price Process — discrete mean-reverting tick generator
// =============================================================================
//
// Produces one stochastic price sample per invocation using a discrete
// Ornstein–Uhlenbeck-style step:
//
//   drift = k * (anchor - p) * dt
//   shock = sigma_rel * p * Z * sqrt(dt)        Z ~ N(0, 1)
//   p'    = max(floor, round_6dp(p + drift + shock))
//
// The drift pulls the price back toward the anchor; the shock scales with the
// current price so volatility stays proportional. A non-finite step result is
// discarded and the previous price is returned unchanged.
//
// Z comes from a Box–Muller transform. Uniform draws of exactly zero are
// rejected and redrawn: ln(0) is -infinity and would otherwise have to be
// caught downstream on every step.
// =============================================================================

use rand::Rng;
use tracing::debug;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single timestamped price sample, as produced by the warm-start replay.
#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    /// Sample time in unix milliseconds.
    pub ts_ms: i64,
    pub price: f64,
}

/// Fixed parameters of the mean-reverting process. Set once at construction;
/// never reconfigured mid-run.
#[derive(Debug, Clone, Copy)]
pub struct PriceProcess {
    /// Price the process reverts toward.
    pub anchor: f64,
    /// Reversion strength per unit time (0 < k < 1).
    pub reversion: f64,
    /// Relative volatility (shock is proportional to the current price).
    pub vol_pct: f64,
    /// Tick interval in seconds.
    pub dt_secs: f64,
    /// Hard lower bound on every generated price.
    pub floor: f64,
}

impl PriceProcess {
    /// Advance the process one step from `prev`.
    ///
    /// The output is always finite and >= the configured floor. If the raw
    /// step evaluates to a non-finite value (pathological input), `prev` is
    /// returned unchanged.
    pub fn next_price(&self, prev: f64, rng: &mut impl Rng) -> f64 {
        let drift = self.reversion * (self.anchor - prev) * self.dt_secs;
        let shock = self.vol_pct * prev * standard_normal(rng) * self.dt_secs.sqrt();

        let next = round_6dp(prev + drift + shock);
        if !next.is_finite() {
            debug!(prev, "discarding non-finite price step");
            return prev;
        }

        next.max(self.floor)
    }
}

/// Round to 6 decimal places (the feed's display precision).
fn round_6dp(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Standard-normal variate via the Box–Muller transform.
///
/// Both uniforms must lie in (0, 1]; `Rng::gen` samples [0, 1), so draws of
/// exactly 0 are rejected and redrawn.
pub fn standard_normal(rng: &mut impl Rng) -> f64 {
    let mut u: f64 = 0.0;
    while u == 0.0 {
        u = rng.gen();
    }
    let mut v: f64 = 0.0;
    while v == 0.0 {
        v = rng.gen();
    }
    (-2.0 * u.ln()).sqrt() * (2.0 * std::f64::consts::PI * v).cos()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn process() -> PriceProcess {
        PriceProcess {
            anchor: 10.0,
            reversion: 0.18,
            vol_pct: 0.006,
            dt_secs: 1.0,
            floor: 0.01,
        }
    }

    #[test]
    fn output_stays_at_or_above_floor() {
        let p = process();
        let mut rng = StdRng::seed_from_u64(7);
        let mut price = p.anchor;
        for _ in 0..10_000 {
            price = p.next_price(price, &mut rng);
            assert!(price >= p.floor);
            assert!(price.is_finite());
        }
    }

    #[test]
    fn output_rounded_to_6dp() {
        let p = process();
        let mut rng = StdRng::seed_from_u64(42);
        let mut price = p.anchor;
        for _ in 0..100 {
            price = p.next_price(price, &mut rng);
            let scaled = price * 1e6;
            assert!(
                (scaled - scaled.round()).abs() < 1e-6,
                "price {price} not rounded to 6dp"
            );
        }
    }

    #[test]
    fn mean_reversion_pulls_toward_anchor() {
        // With zero volatility the step is purely deterministic drift.
        let p = PriceProcess {
            vol_pct: 0.0,
            ..process()
        };
        let mut rng = StdRng::seed_from_u64(0);

        let from_above = p.next_price(20.0, &mut rng);
        assert!(from_above < 20.0 && from_above > p.anchor);

        let from_below = p.next_price(5.0, &mut rng);
        assert!(from_below > 5.0 && from_below < p.anchor);
    }

    #[test]
    fn non_finite_step_returns_previous_price() {
        // f64::MAX makes the drift term overflow to -infinity, so the raw
        // step is non-finite and the previous price must come back.
        let p = process();
        let mut rng = StdRng::seed_from_u64(1);
        let prev = f64::MAX;
        assert_eq!(p.next_price(prev, &mut rng), prev);
    }

    #[test]
    fn nan_previous_price_is_returned_unchanged() {
        let p = process();
        let mut rng = StdRng::seed_from_u64(2);
        let next = p.next_price(f64::NAN, &mut rng);
        assert!(next.is_nan());
    }

    #[test]
    fn floor_clamps_deterministic_crash() {
        // Strong reversion from far above the anchor with no noise can step
        // below the floor in one move; the clamp must hold.
        let p = PriceProcess {
            anchor: 0.0,
            reversion: 0.99,
            vol_pct: 0.0,
            dt_secs: 1.0,
            floor: 0.01,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut price = 0.02;
        for _ in 0..50 {
            price = p.next_price(price, &mut rng);
            assert!(price >= 0.01);
        }
        assert_eq!(price, 0.01);
    }

    #[test]
    fn standard_normal_is_finite_and_plausible() {
        let mut rng = StdRng::seed_from_u64(99);
        let n = 50_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..n {
            let z = standard_normal(&mut rng);
            assert!(z.is_finite());
            sum += z;
            sum_sq += z * z;
        }
        let mean = sum / n as f64;
        let var = sum_sq / n as f64 - mean * mean;
        assert!(mean.abs() < 0.05, "sample mean {mean} too far from 0");
        assert!((var - 1.0).abs() < 0.05, "sample variance {var} too far from 1");
    }

    #[test]
    fn standard_normal_rejects_zero_draws() {
        // An RNG that yields 0.0 first must be redrawn, not produce ln(0).
        struct ZeroThenDelegate {
            zeros_left: u32,
            inner: StdRng,
        }

        impl rand::RngCore for ZeroThenDelegate {
            fn next_u32(&mut self) -> u32 {
                if self.zeros_left > 0 {
                    self.zeros_left -= 1;
                    0
                } else {
                    self.inner.next_u32()
                }
            }

            fn next_u64(&mut self) -> u64 {
                if self.zeros_left > 0 {
                    self.zeros_left -= 1;
                    0
                } else {
                    self.inner.next_u64()
                }
            }

            fn fill_bytes(&mut self, dest: &mut [u8]) {
                rand_core::impls::fill_bytes_via_next(self, dest)
            }

            fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
                self.fill_bytes(dest);
                Ok(())
            }
        }

        let mut rng = ZeroThenDelegate {
            zeros_left: 4,
            inner: StdRng::seed_from_u64(5),
        };
        let z = standard_normal(&mut rng);
        assert!(z.is_finite());
    }
}
