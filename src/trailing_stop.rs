// =============================================================================
// Trailing-stop manager — ATR-scaled adaptive stop with a hard-stop floor
// =============================================================================
//
// Fixed-percentage stops overfit to recent volatility; ATR-scaled stops
// adapt. The monotonicity invariant prevents whipsaw from re-widening a stop
// that has already tightened: a LONG stop never decreases, a SHORT stop
// never increases, for the life of the position.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::{ExitReason, Side};

/// Volatility-regime ATR multipliers (spec §4.4 step 3).
const REGIME_HIGH_VOL_MULT: f64 = 2.2;
const REGIME_MID_VOL_MULT: f64 = 1.8;
const REGIME_LOW_VOL_MULT: f64 = 1.5;
const REGIME_HIGH_VOL_THRESHOLD: f64 = 0.03;
const REGIME_MID_VOL_THRESHOLD: f64 = 0.01;

/// Profit-based tightening thresholds and coefficients (spec §4.4 step 4).
const MIN_PROFIT_THRESHOLD: f64 = 0.005;
const ACCELERATION_STEP: f64 = 0.3;
const DEEP_PROFIT_THRESHOLD: f64 = 0.02;
const DEEP_PROFIT_EXTRA_TIGHTEN: f64 = 0.5;
const DEEP_PROFIT_FLOOR_MULT: f64 = 0.8;
const MIN_TRAIL_MULT: f64 = 1.0;

/// Per-position trailing-stop state. `initialize` must be called before the
/// first `update`; calling `update` first is a logic error in the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStop {
    side: Side,
    entry_price: f64,
    hard_stop_atr_multiplier: f64,
    min_loss_floor_pct: f64,
    extreme_price: f64,
    current_stop_price: f64,
    initialized: bool,
}

/// Outcome of a single-tick stop evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopOutcome {
    Holding { new_stop: f64 },
    Triggered { exit_price: f64, reason: ExitReason },
}

impl TrailingStop {
    pub fn new(side: Side, entry_price: f64, hard_stop_atr_multiplier: f64, min_loss_floor_pct: f64) -> Self {
        Self {
            side,
            entry_price,
            hard_stop_atr_multiplier,
            min_loss_floor_pct,
            extreme_price: entry_price,
            current_stop_price: entry_price,
            initialized: false,
        }
    }

    /// Set up `extreme` and the initial stop from the entry-time ATR reading.
    pub fn initialize(&mut self, atr_pct_at_entry: f64) {
        let hard_stop_distance = self.hard_stop_distance(atr_pct_at_entry);
        self.extreme_price = self.entry_price;
        self.current_stop_price = match self.side {
            Side::Long => self.entry_price * (1.0 - hard_stop_distance),
            Side::Short => self.entry_price * (1.0 + hard_stop_distance),
        };
        self.initialized = true;
    }

    pub fn current_stop_price(&self) -> f64 {
        self.current_stop_price
    }

    pub fn extreme_price(&self) -> f64 {
        self.extreme_price
    }

    fn hard_stop_distance(&self, atr_pct: f64) -> f64 {
        self.min_loss_floor_pct
            .max(atr_pct * self.hard_stop_atr_multiplier)
    }

    fn base_atr_multiplier(atr_pct: f64) -> f64 {
        if atr_pct > REGIME_HIGH_VOL_THRESHOLD {
            REGIME_HIGH_VOL_MULT
        } else if atr_pct > REGIME_MID_VOL_THRESHOLD {
            REGIME_MID_VOL_MULT
        } else {
            REGIME_LOW_VOL_MULT
        }
    }

    /// Evaluate one tick. `assert!`s on misuse (calling before `initialize`)
    /// since that is a programming error in the caller, not a runtime event.
    pub fn update(&mut self, price: f64, atr_like_vol: f64) -> StopOutcome {
        assert!(self.initialized, "TrailingStop::update called before initialize");

        match self.side {
            Side::Long => self.extreme_price = self.extreme_price.max(price),
            Side::Short => self.extreme_price = self.extreme_price.min(price),
        }

        let atr_pct = if price > 0.0 { atr_like_vol / price } else { 0.0 };
        let mut trailing_distance = Self::base_atr_multiplier(atr_pct) * atr_pct;

        let profit_fraction = self.side.sign() * (self.extreme_price - self.entry_price) / self.entry_price;
        if profit_fraction > MIN_PROFIT_THRESHOLD {
            trailing_distance = (MIN_TRAIL_MULT * atr_pct).max(
                trailing_distance
                    - 10.0 * (profit_fraction - MIN_PROFIT_THRESHOLD) * ACCELERATION_STEP * atr_pct,
            );
            if profit_fraction > DEEP_PROFIT_THRESHOLD {
                trailing_distance =
                    (DEEP_PROFIT_FLOOR_MULT * atr_pct).max(trailing_distance - DEEP_PROFIT_EXTRA_TIGHTEN * atr_pct);
            }
        }

        let candidate_trailing = match self.side {
            Side::Long => self.extreme_price * (1.0 - trailing_distance),
            Side::Short => self.extreme_price * (1.0 + trailing_distance),
        };

        let hard_stop_distance = self.hard_stop_distance(atr_pct);
        let hard_stop_price = match self.side {
            Side::Long => self.entry_price * (1.0 - hard_stop_distance),
            Side::Short => self.entry_price * (1.0 + hard_stop_distance),
        };

        let new_stop = match self.side {
            Side::Long => self
                .current_stop_price
                .max(candidate_trailing.min(hard_stop_price)),
            Side::Short => self
                .current_stop_price
                .min(candidate_trailing.max(hard_stop_price)),
        };

        debug_assert!(
            match self.side {
                Side::Long => new_stop >= self.current_stop_price,
                Side::Short => new_stop <= self.current_stop_price,
            },
            "trailing stop must be monotone"
        );
        self.current_stop_price = new_stop;

        let triggered = match self.side {
            Side::Long => price <= new_stop,
            Side::Short => price >= new_stop,
        };

        if triggered {
            let reason = match self.side {
                Side::Long => {
                    if candidate_trailing >= hard_stop_price {
                        ExitReason::TrailingStop
                    } else {
                        ExitReason::HardStop
                    }
                }
                Side::Short => {
                    if candidate_trailing <= hard_stop_price {
                        ExitReason::TrailingStop
                    } else {
                        ExitReason::HardStop
                    }
                }
            };
            StopOutcome::Triggered { exit_price: new_stop, reason }
        } else {
            StopOutcome::Holding { new_stop }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "before initialize")]
    fn update_before_initialize_panics() {
        let mut stop = TrailingStop::new(Side::Long, 100.0, 2.0, 0.01);
        stop.update(100.0, 1.0);
    }

    #[test]
    fn long_stop_is_monotone_non_decreasing() {
        let mut stop = TrailingStop::new(Side::Long, 100.0, 2.0, 0.01);
        stop.initialize(0.02);
        let mut last = stop.current_stop_price();
        for price in [101.0, 103.0, 102.5, 104.0, 103.0, 105.0] {
            if let StopOutcome::Holding { new_stop } = stop.update(price, 2.0) {
                assert!(new_stop >= last - 1e-9);
                last = new_stop;
            }
        }
    }

    #[test]
    fn short_stop_is_monotone_non_increasing() {
        let mut stop = TrailingStop::new(Side::Short, 100.0, 2.0, 0.01);
        stop.initialize(0.02);
        let mut last = stop.current_stop_price();
        for price in [99.0, 97.0, 98.0, 95.0, 96.0] {
            if let StopOutcome::Holding { new_stop } = stop.update(price, 2.0) {
                assert!(new_stop <= last + 1e-9);
                last = new_stop;
            }
        }
    }

    // LONG at 100, atr_like_vol/price = 0.04, hard_stop_atr_multiplier = 2.0,
    // min_loss_floor_pct = 0.01: hard_stop_price = 100 * (1 - max(0.01, 0.08)) = 92.
    #[test]
    fn hard_stop_scales_with_atr_not_fixed_floor() {
        let mut stop = TrailingStop::new(Side::Long, 100.0, 2.0, 0.01);
        stop.initialize(0.04);
        // atr_like_vol such that atr_like_vol/price = 0.04 at price ~100
        let outcome = stop.update(93.0, 4.0);
        assert!(matches!(outcome, StopOutcome::Holding { .. }), "93 must not trigger hard stop");

        let outcome = stop.update(91.9, 4.0);
        assert!(matches!(outcome, StopOutcome::Triggered { reason: ExitReason::HardStop, .. }));
    }

    #[test]
    fn trigger_reason_is_trailing_stop_when_trailing_is_tighter() {
        let mut stop = TrailingStop::new(Side::Long, 100.0, 10.0, 0.001);
        stop.initialize(0.005);
        // run price up to build a wide profit buffer, then drop hard to trigger trailing stop
        stop.update(110.0, 0.5);
        stop.update(120.0, 0.5);
        let outcome = stop.update(100.0, 0.5);
        if let StopOutcome::Triggered { reason, .. } = outcome {
            assert_eq!(reason, ExitReason::TrailingStop);
        }
    }

    #[test]
    fn deep_profit_tightens_further_than_shallow_profit() {
        let mut shallow = TrailingStop::new(Side::Long, 100.0, 2.0, 0.01);
        shallow.initialize(0.02);
        shallow.update(100.6, 2.0); // profit_fraction = 0.006, just above threshold

        let mut deep = TrailingStop::new(Side::Long, 100.0, 2.0, 0.01);
        deep.initialize(0.02);
        deep.update(103.0, 2.0); // profit_fraction = 0.03, above deep threshold

        // Deep profit stop should sit closer to the extreme (tighter trail).
        let shallow_gap = 100.6 - shallow.current_stop_price();
        let deep_gap = 103.0 - deep.current_stop_price();
        assert!(deep_gap / 103.0 <= shallow_gap / 100.6 + 1e-6);
    }

    // Boundary law: with an effectively infinite hard-stop multiplier, the
    // hard-stop floor never binds, so every trigger must be TRAILING_STOP.
    #[test]
    fn disabled_hard_stop_never_triggers_hard_stop_exit() {
        let mut stop = TrailingStop::new(Side::Long, 100.0, f64::MAX / 4.0, 0.01);
        stop.initialize(0.02);
        let path = [101.0, 103.0, 106.0, 104.0, 101.0, 98.0, 95.0, 90.0, 80.0];
        for price in path {
            match stop.update(price, 2.0) {
                StopOutcome::Triggered { reason, .. } => {
                    assert_eq!(reason, ExitReason::TrailingStop);
                    break;
                }
                StopOutcome::Holding { .. } => {}
            }
        }
    }
}
