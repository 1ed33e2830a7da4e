// =============================================================================
// Signal generator — HOLD / ENTRY_BOTH / CLOSE_ALL
// =============================================================================
//
// Consumes the latest indicator snapshot, the per-symbol cooldown clock, and
// a coin-specific parameter set. All thresholds are read from `CoinParams` —
// never hardcoded here — so a low-volatility symbol isn't silently filtered
// out by a threshold tuned for a different coin.
// =============================================================================

use crate::config::{CoinParams, StrategyVariant};
use crate::indicators::IndicatorSnapshot;

/// Minimum composite strength required to fire an entry (spec §4.3).
pub const MIN_ENTRY_STRENGTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Hold,
    EntryBoth { strength: f64 },
    CloseAll,
}

/// Which open slots exist for a symbol right now — the signal generator
/// needs this to know whether an entry is even eligible.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSlots {
    pub long_open: bool,
    pub short_open: bool,
}

impl OpenSlots {
    pub fn any_open(&self) -> bool {
        self.long_open || self.short_open
    }
}

/// Stateless — every call is a pure function of its inputs. The "generator"
/// is really just a namespace for `evaluate`; no instance state is needed.
pub struct SignalGenerator;

impl SignalGenerator {
    /// Evaluate one symbol at signal-cadence time (every M ticks, spec §4.3).
    pub fn evaluate(
        snapshot: &IndicatorSnapshot,
        params: &CoinParams,
        now_ms: i64,
        last_entry_time_ms: Option<i64>,
        open: OpenSlots,
    ) -> Signal {
        if open.any_open() {
            if Self::should_close(snapshot) {
                return Signal::CloseAll;
            }
            return Signal::Hold;
        }

        if Self::should_enter(snapshot, params, now_ms, last_entry_time_ms) {
            let strength = Self::strength(snapshot, params);
            if strength >= MIN_ENTRY_STRENGTH {
                return Signal::EntryBoth { strength };
            }
        }
        Signal::Hold
    }

    /// Entry conditions 1–6 of the entry rule (strength is checked separately
    /// by the caller since it doubles as the returned value).
    fn should_enter(
        snapshot: &IndicatorSnapshot,
        params: &CoinParams,
        now_ms: i64,
        last_entry_time_ms: Option<i64>,
    ) -> bool {
        if params.excluded {
            return false;
        }
        if let Some(last) = last_entry_time_ms {
            let elapsed_secs = (now_ms - last) as f64 / 1000.0;
            if elapsed_secs < params.cooldown_seconds as f64 {
                return false;
            }
        }
        if !snapshot.bb_position_valid() {
            return false;
        }

        let price = snapshot.last_price;
        if price <= 0.0 {
            return false;
        }
        let hybrid_vol_pct = snapshot.hybrid_vol / price;
        let atr_vol_pct = snapshot.atr_like_vol / price;

        if hybrid_vol_pct < params.hybrid_vol_threshold_pct {
            return false;
        }
        if atr_vol_pct < params.atr_vol_threshold_pct {
            return false;
        }
        if !(params.bb_band_min..=params.bb_band_max).contains(&snapshot.bb_position) {
            return false;
        }
        if params.strategy_variant == StrategyVariant::Selective
            && snapshot.momentum.abs() < 1e-4
        {
            return false;
        }
        true
    }

    /// `strength = 0.5*compression_strength + 0.5*expansion_strength`, using
    /// only coin-specific thresholds.
    fn strength(snapshot: &IndicatorSnapshot, params: &CoinParams) -> f64 {
        let price = snapshot.last_price;
        let bb_bandwidth = if snapshot.bb_middle != 0.0 {
            (snapshot.bb_upper - snapshot.bb_lower) / snapshot.bb_middle
        } else {
            0.0
        };
        let bb_band_threshold = params.hybrid_vol_threshold_pct;
        let compression_strength =
            ((bb_band_threshold - bb_bandwidth) / bb_band_threshold).clamp(0.0, 1.0);

        let atr_vol_pct = snapshot.atr_like_vol / price;
        let expansion_strength = (atr_vol_pct / params.atr_vol_threshold_pct).clamp(0.0, 1.0);

        0.5 * compression_strength + 0.5 * expansion_strength
    }

    /// `CLOSE_ALL` iff volatility has collapsed or price has run to a band
    /// extreme.
    fn should_close(snapshot: &IndicatorSnapshot) -> bool {
        if !snapshot.bb_position_valid() {
            return false;
        }
        let collapsed = snapshot.hybrid_vol < 0.1 * snapshot.atr_like_vol;
        let extreme = snapshot.bb_position < 0.1 || snapshot.bb_position > 0.9;
        collapsed || extreme
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(hybrid_vol: f64, atr_like_vol: f64, bb_position: f64, momentum: f64, price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            vwap: price,
            tick_variance_vol: hybrid_vol / 10.0,
            atr_like_vol,
            hybrid_vol,
            bb_middle: price,
            bb_upper: price * 1.01,
            bb_lower: price * 0.99,
            bb_position,
            momentum,
            last_price: price,
        }
    }

    fn selective_params() -> CoinParams {
        CoinParams::with_variant_defaults("BTCUSDT", StrategyVariant::Selective)
    }

    #[test]
    fn cooldown_blocks_entry() {
        let params = selective_params();
        let snap = snapshot(0.1, 0.4, 0.5, 0.001, 100.0);
        let sig = SignalGenerator::evaluate(&snap, &params, 100_000, Some(0), OpenSlots::default());
        assert_eq!(sig, Signal::Hold);
    }

    #[test]
    fn cooldown_elapsed_allows_entry() {
        let params = selective_params();
        // hybrid_vol_pct = 0.1/100 = 0.001 >= 0.0008; atr_vol_pct = 0.4/100 = 0.004 >= 0.003
        let snap = snapshot(0.1, 0.4, 0.50, 0.001, 100.0);
        let sig = SignalGenerator::evaluate(&snap, &params, 301_000, Some(0), OpenSlots::default());
        assert!(matches!(sig, Signal::EntryBoth { .. }));
    }

    #[test]
    fn excluded_symbol_never_enters() {
        let mut params = selective_params();
        params.excluded = true;
        let snap = snapshot(0.1, 0.4, 0.50, 0.001, 100.0);
        let sig = SignalGenerator::evaluate(&snap, &params, 301_000, None, OpenSlots::default());
        assert_eq!(sig, Signal::Hold);
    }

    #[test]
    fn selective_variant_requires_momentum() {
        let params = selective_params();
        let snap = snapshot(0.1, 0.4, 0.50, 0.0, 100.0); // momentum below 1e-4
        let sig = SignalGenerator::evaluate(&snap, &params, 301_000, None, OpenSlots::default());
        assert_eq!(sig, Signal::Hold);
    }

    #[test]
    fn invalid_bb_position_is_hold() {
        let params = selective_params();
        let snap = snapshot(0.1, 0.4, f64::NAN, 0.001, 100.0);
        let sig = SignalGenerator::evaluate(&snap, &params, 301_000, None, OpenSlots::default());
        assert_eq!(sig, Signal::Hold);
    }

    #[test]
    fn close_all_on_volatility_collapse() {
        let snap = snapshot(0.5, 6.0, 0.5, 0.0, 100.0); // hybrid < 0.1*atr
        let params = selective_params();
        let open = OpenSlots { long_open: true, short_open: true };
        let sig = SignalGenerator::evaluate(&snap, &params, 0, None, open);
        assert_eq!(sig, Signal::CloseAll);
    }

    #[test]
    fn close_all_on_band_extreme() {
        let snap = snapshot(10.0, 10.0, 0.95, 0.0, 100.0);
        let params = selective_params();
        let open = OpenSlots { long_open: true, short_open: false };
        let sig = SignalGenerator::evaluate(&snap, &params, 0, None, open);
        assert_eq!(sig, Signal::CloseAll);
    }

    #[test]
    fn open_positions_without_close_condition_hold() {
        let snap = snapshot(10.0, 10.0, 0.5, 0.0, 100.0);
        let params = selective_params();
        let open = OpenSlots { long_open: true, short_open: true };
        let sig = SignalGenerator::evaluate(&snap, &params, 0, None, open);
        assert_eq!(sig, Signal::Hold);
    }
}
