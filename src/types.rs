// =============================================================================
// Shared types used across the straddle trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single trade print from the exchange — the atomic unit of market data.
///
/// Invariant: within a single symbol's stream, `timestamp_ms` is
/// non-decreasing. The supervisor enforces this at ingestion; this type makes
/// no attempt to validate it itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp_ms: i64,
    pub price: f64,
    pub volume: f64,
    #[serde(default)]
    pub is_buyer_maker: bool,
}

impl Tick {
    pub fn new(timestamp_ms: i64, price: f64, volume: f64, is_buyer_maker: bool) -> Self {
        Self {
            timestamp_ms,
            price,
            volume,
            is_buyer_maker,
        }
    }
}

/// Which side of the market a position (or order) sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for Long, -1 for Short — signs P&L and extreme-price comparisons.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Reason a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TrailingStop,
    HardStop,
    SignalClose,
    LiquidationGuard,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrailingStop => write!(f, "TRAILING_STOP"),
            Self::HardStop => write!(f, "HARD_STOP"),
            Self::SignalClose => write!(f, "SIGNAL_CLOSE"),
            Self::LiquidationGuard => write!(f, "LIQUIDATION_GUARD"),
        }
    }
}

/// Whether the engine is allowed to actually place orders.
///
/// The engine always starts `Paused`; an explicit operator action is required
/// to go `Live`. Ticks still flow and indicators/stops still update while
/// paused — only the order-placement step of the per-tick pipeline is gated,
/// so flipping back to `Live` never loses buffered state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paused,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paused
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Paused => write!(f, "Paused"),
        }
    }
}

/// The per-symbol engine state machine's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    LongOnly,
    ShortOnly,
    BothOpen,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::LongOnly => write!(f, "LONG_ONLY"),
            Self::ShortOnly => write!(f, "SHORT_ONLY"),
            Self::BothOpen => write!(f, "BOTH_OPEN"),
        }
    }
}
