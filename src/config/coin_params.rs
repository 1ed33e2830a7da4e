// =============================================================================
// Coin Parameters — per-symbol, read-only after load
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Which strength/threshold profile a symbol trades under.
///
/// Variant-specific *numbers* live here in `CoinParams`, not hardcoded in the
/// signal generator — only the rule *shape* (e.g. the extra momentum gate on
/// `Selective`) is variant-specific code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyVariant {
    Conservative,
    Selective,
    Aggressive,
}

impl std::fmt::Display for StrategyVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::Selective => write!(f, "selective"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// Per-symbol overrides loaded once at startup and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinParams {
    pub symbol: String,
    #[serde(default)]
    pub excluded: bool,
    pub strategy_variant: StrategyVariant,
    pub hybrid_vol_threshold_pct: f64,
    pub atr_vol_threshold_pct: f64,
    pub bb_band_min: f64,
    pub bb_band_max: f64,
    pub cooldown_seconds: i64,
    pub position_size_fraction: f64,
    pub leverage: u32,
    pub hard_stop_atr_multiplier: f64,
    pub min_loss_floor_pct: f64,
}

impl CoinParams {
    /// Validate the invariants `spec.md` §3 requires at load time.
    fn validate(&self) -> Result<()> {
        if !(self.bb_band_min < self.bb_band_max) {
            bail!(
                "{}: bb_band_min ({}) must be < bb_band_max ({})",
                self.symbol,
                self.bb_band_min,
                self.bb_band_max
            );
        }
        if self.hard_stop_atr_multiplier < 1.0 {
            bail!(
                "{}: hard_stop_atr_multiplier ({}) must be >= 1.0",
                self.symbol,
                self.hard_stop_atr_multiplier
            );
        }
        if self.min_loss_floor_pct <= 0.0 {
            bail!(
                "{}: min_loss_floor_pct ({}) must be > 0",
                self.symbol,
                self.min_loss_floor_pct
            );
        }
        if self.position_size_fraction <= 0.0 || self.position_size_fraction > 1.0 {
            bail!(
                "{}: position_size_fraction ({}) must be in (0, 1]",
                self.symbol,
                self.position_size_fraction
            );
        }
        if self.leverage < 1 {
            bail!("{}: leverage must be >= 1", self.symbol);
        }
        if self.cooldown_seconds < 0 {
            bail!("{}: cooldown_seconds must be >= 0", self.symbol);
        }
        Ok(())
    }

    /// Strategy-variant numbers used by the entry rule (spec §4.3), baked into
    /// each `CoinParams` record at load time rather than looked up from a
    /// global table at evaluation time.
    pub fn defaults_for(variant: StrategyVariant) -> (f64, f64, f64, f64, i64) {
        match variant {
            StrategyVariant::Conservative => (0.0004, 0.0015, 0.40, 0.60, 300),
            StrategyVariant::Selective => (0.0008, 0.0030, 0.48, 0.52, 300),
            StrategyVariant::Aggressive => (0.0002, 0.0010, 0.35, 0.65, 180),
        }
    }

    /// Build a `CoinParams` record from just a symbol and variant, filling in
    /// the variant's default thresholds. Convenience for tests and for
    /// operators who don't need per-symbol overrides.
    pub fn with_variant_defaults(symbol: impl Into<String>, variant: StrategyVariant) -> Self {
        let (hybrid, atr, band_min, band_max, cooldown) = Self::defaults_for(variant);
        Self {
            symbol: symbol.into(),
            excluded: false,
            strategy_variant: variant,
            hybrid_vol_threshold_pct: hybrid,
            atr_vol_threshold_pct: atr,
            bb_band_min: band_min,
            bb_band_max: band_max,
            cooldown_seconds: cooldown,
            position_size_fraction: 0.05,
            leverage: 3,
            hard_stop_atr_multiplier: 2.0,
            min_loss_floor_pct: 0.01,
        }
    }
}

/// A table of all known symbols' parameters, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct CoinParamsTable {
    by_symbol: HashMap<String, CoinParams>,
}

impl CoinParamsTable {
    /// Load the coin-parameter table from a JSON array at `path`.
    ///
    /// Every record is validated and symbol uniqueness is checked, matching
    /// the "Invariants checked at load" clause of the external interface.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read coin params from {}", path.display()))?;
        let records: Vec<CoinParams> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse coin params from {}", path.display()))?;

        let mut by_symbol = HashMap::with_capacity(records.len());
        for record in records {
            record
                .validate()
                .with_context(|| format!("invalid coin params for {}", record.symbol))?;
            if by_symbol.insert(record.symbol.clone(), record).is_some() {
                bail!("duplicate symbol in coin params file");
            }
        }

        tracing::info!(count = by_symbol.len(), path = %path.display(), "coin params loaded");
        Ok(Self { by_symbol })
    }

    pub fn get(&self, symbol: &str) -> Option<&CoinParams> {
        self.by_symbol.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.by_symbol.keys().map(String::as_str)
    }

    pub fn insert(&mut self, params: CoinParams) {
        self.by_symbol.insert(params.symbol.clone(), params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_band() {
        let mut p = CoinParams::with_variant_defaults("BTCUSDT", StrategyVariant::Selective);
        p.bb_band_min = 0.6;
        p.bb_band_max = 0.4;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_hard_stop_multiplier_below_one() {
        let mut p = CoinParams::with_variant_defaults("BTCUSDT", StrategyVariant::Selective);
        p.hard_stop_atr_multiplier = 0.5;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_zero_loss_floor() {
        let mut p = CoinParams::with_variant_defaults("BTCUSDT", StrategyVariant::Selective);
        p.min_loss_floor_pct = 0.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn variant_defaults_match_documented_numbers() {
        let (hybrid, atr, min, max, cooldown) =
            CoinParams::defaults_for(StrategyVariant::Selective);
        assert!((hybrid - 0.0008).abs() < 1e-12);
        assert!((atr - 0.0030).abs() < 1e-12);
        assert!((min - 0.48).abs() < 1e-12);
        assert!((max - 0.52).abs() < 1e-12);
        assert_eq!(cooldown, 300);
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join("squall_coin_params_dup_test.json");
        std::fs::write(
            &path,
            r#"[
                {"symbol":"BTCUSDT","strategy_variant":"selective","hybrid_vol_threshold_pct":0.0008,"atr_vol_threshold_pct":0.003,"bb_band_min":0.48,"bb_band_max":0.52,"cooldown_seconds":300,"position_size_fraction":0.05,"leverage":3,"hard_stop_atr_multiplier":2.0,"min_loss_floor_pct":0.01},
                {"symbol":"BTCUSDT","strategy_variant":"aggressive","hybrid_vol_threshold_pct":0.0002,"atr_vol_threshold_pct":0.001,"bb_band_min":0.35,"bb_band_max":0.65,"cooldown_seconds":180,"position_size_fraction":0.05,"leverage":3,"hard_stop_atr_multiplier":2.0,"min_loss_floor_pct":0.01}
            ]"#,
        )
        .unwrap();
        let result = CoinParamsTable::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
