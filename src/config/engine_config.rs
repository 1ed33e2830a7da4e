// =============================================================================
// Engine Configuration — global knobs shared across every symbol worker
// =============================================================================
//
// Distinct from `CoinParams`, which is per-symbol. `EngineConfig` holds the
// settings that apply uniformly: starting equity, fee/slippage rates, buffer
// sizing, signal cadence, and channel capacity. Loaded once at startup;
// read-only thereafter, so it is freely shared behind an `Arc`.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::TradingMode;

fn default_starting_equity() -> f64 {
    10_000.0
}

fn default_taker_fee_rate() -> f64 {
    0.0005
}

fn default_maker_fee_rate() -> f64 {
    0.0002
}

fn default_slippage_rate() -> f64 {
    0.0001
}

fn default_tick_buffer_capacity() -> usize {
    10_000
}

fn default_atr_subwindow() -> usize {
    100
}

fn default_lookback_seconds() -> f64 {
    60.0
}

fn default_signal_cadence() -> u64 {
    10
}

fn default_tick_channel_capacity() -> usize {
    1024
}

fn default_bb_k() -> f64 {
    2.0
}

fn default_bb_epsilon() -> f64 {
    1e-6
}

fn default_market_order_deadline_secs() -> u64 {
    5
}

fn default_limit_order_deadline_secs() -> u64 {
    30
}

/// Global engine settings. Every field carries a serde default so an older
/// config file missing new fields still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine starts Paused; an explicit operator action is required to trade.
    #[serde(default)]
    pub trading_mode: TradingMode,

    #[serde(default = "default_starting_equity")]
    pub starting_equity: f64,

    #[serde(default = "default_taker_fee_rate")]
    pub taker_fee_rate: f64,

    #[serde(default = "default_maker_fee_rate")]
    pub maker_fee_rate: f64,

    #[serde(default = "default_slippage_rate")]
    pub slippage_rate: f64,

    /// Default N = 10,000 ticks (spec §3).
    #[serde(default = "default_tick_buffer_capacity")]
    pub tick_buffer_capacity: usize,

    /// Default W = 100 ticks (spec §4.2).
    #[serde(default = "default_atr_subwindow")]
    pub atr_subwindow: usize,

    /// Window (in seconds, inclusive of the newest tick) the momentum and
    /// VWAP/band indicators look back over (spec §4.1/§4.2). The ATR
    /// sub-window above still runs over the full buffer, not this window.
    #[serde(default = "default_lookback_seconds")]
    pub lookback_seconds: f64,

    /// Default M = 10 ticks (spec §4.3).
    #[serde(default = "default_signal_cadence")]
    pub signal_cadence: u64,

    /// Default 1024 (spec §5 backpressure).
    #[serde(default = "default_tick_channel_capacity")]
    pub tick_channel_capacity: usize,

    #[serde(default = "default_bb_k")]
    pub bb_k: f64,

    #[serde(default = "default_bb_epsilon")]
    pub bb_epsilon: f64,

    #[serde(default = "default_market_order_deadline_secs")]
    pub market_order_deadline_secs: u64,

    #[serde(default = "default_limit_order_deadline_secs")]
    pub limit_order_deadline_secs: u64,

    /// Replay mode uses unbounded, blocking channels for determinism instead
    /// of the bounded/drop-oldest channel used live (spec §5).
    #[serde(default)]
    pub replay: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            starting_equity: default_starting_equity(),
            taker_fee_rate: default_taker_fee_rate(),
            maker_fee_rate: default_maker_fee_rate(),
            slippage_rate: default_slippage_rate(),
            tick_buffer_capacity: default_tick_buffer_capacity(),
            atr_subwindow: default_atr_subwindow(),
            lookback_seconds: default_lookback_seconds(),
            signal_cadence: default_signal_cadence(),
            tick_channel_capacity: default_tick_channel_capacity(),
            bb_k: default_bb_k(),
            bb_epsilon: default_bb_epsilon(),
            market_order_deadline_secs: default_market_order_deadline_secs(),
            limit_order_deadline_secs: default_limit_order_deadline_secs(),
            replay: false,
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            trading_mode = %config.trading_mode,
            starting_equity = config.starting_equity,
            "engine config loaded"
        );
        Ok(config)
    }

    /// Build a config tuned for deterministic replay (unbounded channels,
    /// `replay = true`); starting equity and fee rates still come from the
    /// caller's base config.
    pub fn for_replay(mut self) -> Self {
        self.replay = true;
        self
    }
}
