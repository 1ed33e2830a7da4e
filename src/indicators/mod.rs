// =============================================================================
// Tick indicators — stateless functions over a tick window
// =============================================================================
//
// Every indicator here is a pure function of a tick slice; none of them
// mutate their input or retain state between calls. Indicators that cannot
// be computed from too little data return `None` ("undefined") rather than
// panicking or returning a sentinel value baked into the number — the
// signal generator treats any `None` input as HOLD.
// =============================================================================

use crate::types::Tick;

/// Bollinger-style band width used to gate entries (design constant, spec §4.2).
pub const BB_K: f64 = 2.0;
/// Minimum band width, as a fraction of price, below which `bb_position` is
/// considered numerically meaningless (design constant, spec §4.2).
pub const BB_EPSILON: f64 = 1e-6;
/// Sub-window size for ATR-like volatility (design constant, spec §4.2).
pub const ATR_SUBWINDOW: usize = 100;

/// A complete set of derived readings for one `(TickBuffer, lookback)` pair.
/// Ephemeral — never persisted, recomputed every time it's needed.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSnapshot {
    pub vwap: f64,
    pub tick_variance_vol: f64,
    pub atr_like_vol: f64,
    pub hybrid_vol: f64,
    pub bb_middle: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    /// `NaN` when the band is too narrow to be meaningful (spec §4.2).
    pub bb_position: f64,
    pub momentum: f64,
    pub last_price: f64,
}

impl IndicatorSnapshot {
    /// `bb_position` is only a usable gating input when it is finite.
    pub fn bb_position_valid(&self) -> bool {
        self.bb_position.is_finite()
    }
}

/// Volume-weighted average price over `window`. Falls back to the arithmetic
/// mean when total volume is zero; undefined on an empty window.
pub fn vwap(window: &[Tick]) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let total_volume: f64 = window.iter().map(|t| t.volume).sum();
    if total_volume == 0.0 {
        let sum: f64 = window.iter().map(|t| t.price).sum();
        return Some(sum / window.len() as f64);
    }
    let weighted: f64 = window.iter().map(|t| t.price * t.volume).sum();
    Some(weighted / total_volume)
}

/// Sample standard deviation (n-1) of tick-to-tick price changes. Requires at
/// least 2 ticks.
pub fn tick_variance_vol(window: &[Tick]) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = window
        .windows(2)
        .map(|pair| pair[1].price - pair[0].price)
        .collect();
    let n = diffs.len() as f64;
    let mean = diffs.iter().sum::<f64>() / n;
    let variance = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Mean high-minus-low range over non-overlapping sub-windows of `w` ticks.
/// Requires at least `w` ticks.
pub fn atr_like_vol(window: &[Tick], w: usize) -> Option<f64> {
    if w == 0 || window.len() < w {
        return None;
    }
    let ranges: Vec<f64> = window
        .chunks(w)
        .filter(|chunk| chunk.len() == w)
        .map(|chunk| {
            let high = chunk.iter().map(|t| t.price).fold(f64::MIN, f64::max);
            let low = chunk.iter().map(|t| t.price).fold(f64::MAX, f64::min);
            high - low
        })
        .collect();
    if ranges.is_empty() {
        return None;
    }
    Some(ranges.iter().sum::<f64>() / ranges.len() as f64)
}

/// `max(tick_variance_vol * 10.0, atr_like_vol * 0.2)`.
///
/// The `max` (not `min`) is essential: the `min` form collapses to the
/// tick-variance term and never triggers entries. The scaling factors bring
/// the two measures into comparable ranges and are design constants, not
/// free parameters.
pub fn hybrid_vol(tick_variance_vol: f64, atr_like_vol: f64) -> f64 {
    (tick_variance_vol * 10.0).max(atr_like_vol * 0.2)
}

/// VWAP-centred Bollinger bands: `(middle, upper, lower)`.
pub fn bollinger_bands(vwap: f64, tick_variance_vol: f64, k: f64) -> (f64, f64, f64) {
    let middle = vwap;
    let upper = vwap + k * tick_variance_vol;
    let lower = vwap - k * tick_variance_vol;
    (middle, upper, lower)
}

/// Fractional location of `price` within `[lower, upper]`. Returns `NaN` when
/// the band is narrower than `epsilon * price` — the signal generator must
/// treat a `NaN` result as "no valid band."
pub fn bb_position(price: f64, upper: f64, lower: f64, epsilon: f64) -> f64 {
    let width = upper - lower;
    if width <= epsilon * price {
        return f64::NAN;
    }
    (price - lower) / width
}

/// `(price_now - price_then) / price_then`, where `price_then` is the
/// earliest tick in the lookback window.
pub fn momentum(window: &[Tick], price_now: f64) -> Option<f64> {
    let first = window.first()?;
    if first.price == 0.0 {
        return None;
    }
    Some((price_now - first.price) / first.price)
}

/// Compute a full snapshot from a lookback-window slice (oldest-first) and
/// the buffer's full-window slice used for ATR sub-windowing. Returns `None`
/// if any required input is undefined — the caller (signal generator /
/// trailing-stop manager) treats that as "skip this tick."
pub fn compute_snapshot(
    lookback_window: &[Tick],
    atr_window: &[Tick],
    w: usize,
    k: f64,
    epsilon: f64,
) -> Option<IndicatorSnapshot> {
    let last = lookback_window.last()?;
    let vwap_val = vwap(lookback_window)?;
    let tv_vol = tick_variance_vol(lookback_window)?;
    let atr_vol = atr_like_vol(atr_window, w)?;
    let hybrid = hybrid_vol(tv_vol, atr_vol);
    let (middle, upper, lower) = bollinger_bands(vwap_val, tv_vol, k);
    let bbp = bb_position(last.price, upper, lower, epsilon);
    let mom = momentum(lookback_window, last.price)?;

    Some(IndicatorSnapshot {
        vwap: vwap_val,
        tick_variance_vol: tv_vol,
        atr_like_vol: atr_vol,
        hybrid_vol: hybrid,
        bb_middle: middle,
        bb_upper: upper,
        bb_lower: lower,
        bb_position: bbp,
        momentum: mom,
        last_price: last.price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ts: i64, price: f64, volume: f64) -> Tick {
        Tick::new(ts, price, volume, false)
    }

    #[test]
    fn vwap_empty_is_undefined() {
        assert!(vwap(&[]).is_none());
    }

    #[test]
    fn vwap_zero_volume_falls_back_to_mean() {
        let ticks = vec![tick(0, 10.0, 0.0), tick(1, 20.0, 0.0)];
        assert_eq!(vwap(&ticks), Some(15.0));
    }

    #[test]
    fn vwap_weights_by_volume() {
        let ticks = vec![tick(0, 10.0, 1.0), tick(1, 20.0, 3.0)];
        // (10*1 + 20*3) / 4 = 17.5
        assert_eq!(vwap(&ticks), Some(17.5));
    }

    #[test]
    fn tick_variance_vol_requires_two_ticks() {
        assert!(tick_variance_vol(&[tick(0, 1.0, 1.0)]).is_none());
    }

    #[test]
    fn tick_variance_vol_constant_price_is_zero() {
        let ticks: Vec<Tick> = (0..10).map(|i| tick(i, 100.0, 1.0)).collect();
        assert_eq!(tick_variance_vol(&ticks), Some(0.0));
    }

    #[test]
    fn atr_like_vol_requires_full_subwindow() {
        let ticks: Vec<Tick> = (0..50).map(|i| tick(i, 100.0, 1.0)).collect();
        assert!(atr_like_vol(&ticks, 100).is_none());
    }

    #[test]
    fn atr_like_vol_averages_subwindow_ranges() {
        // two sub-windows of 2 ticks: ranges [1.0, 1.0] (prices 100,101 / 102,103)
        let ticks = vec![
            tick(0, 100.0, 1.0),
            tick(1, 101.0, 1.0),
            tick(2, 102.0, 1.0),
            tick(3, 103.0, 1.0),
        ];
        let v = atr_like_vol(&ticks, 2).unwrap();
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hybrid_vol_uses_max_not_min() {
        // tick_variance_vol*10 = 5.0, atr_like_vol*0.2 = 1.0 -> expect 5.0
        assert_eq!(hybrid_vol(0.5, 5.0), 5.0);
        // tick_variance_vol*10 = 1.0, atr_like_vol*0.2 = 6.0 -> expect 6.0
        assert_eq!(hybrid_vol(0.1, 30.0), 6.0);
    }

    #[test]
    fn bb_position_nan_on_narrow_band() {
        let pos = bb_position(100.0, 100.0000001, 99.9999999, 1e-6);
        assert!(pos.is_nan());
    }

    #[test]
    fn bb_position_midband_is_half() {
        let pos = bb_position(100.0, 110.0, 90.0, 1e-6);
        assert!((pos - 0.5).abs() < 1e-9);
    }

    #[test]
    fn momentum_requires_nonzero_first_price() {
        let ticks = vec![tick(0, 0.0, 1.0), tick(1, 10.0, 1.0)];
        assert!(momentum(&ticks, 10.0).is_none());
    }

    #[test]
    fn momentum_computes_relative_change() {
        let ticks = vec![tick(0, 100.0, 1.0), tick(1, 110.0, 1.0)];
        assert_eq!(momentum(&ticks, 110.0), Some(0.1));
    }

    #[test]
    fn compute_snapshot_undefined_when_atr_window_too_short() {
        let ticks: Vec<Tick> = (0..5).map(|i| tick(i, 100.0, 1.0)).collect();
        assert!(compute_snapshot(&ticks, &ticks, 100, BB_K, BB_EPSILON).is_none());
    }

    #[test]
    fn compute_snapshot_full_pipeline() {
        let ticks: Vec<Tick> = (0..200)
            .map(|i| tick(i, 100.0 + (i as f64 * 0.01), 1.0))
            .collect();
        let snap = compute_snapshot(&ticks, &ticks, 100, BB_K, BB_EPSILON).unwrap();
        assert!(snap.vwap > 0.0);
        assert!(snap.hybrid_vol >= 0.0);
    }
}
