// =============================================================================
// Position ledger — open positions, realized trades, equity, aggregates
// =============================================================================
//
// The ledger owner serializes all mutations (spec §5): equity, the fee
// counter, and the closed-trade log are shared across symbol workers, so
// every mutating method here takes `&mut self` and the supervisor is
// responsible for holding the ledger behind a single mutex/owner task.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::types::{ExitReason, Side};

/// An open position. `current_stop_price` is owned by the caller's
/// `TrailingStop` in practice; the ledger stores the latest value for
/// persistence and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: i64,
    pub quantity: f64,
    pub leverage: u32,
    pub extreme_favorable_price: f64,
    pub current_stop_price: f64,
    pub opened_by_signal_id: String,
}

/// A closed position, carrying the realized P&L breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: i64,
    pub quantity: f64,
    pub leverage: u32,
    pub exit_price: f64,
    pub exit_time: i64,
    pub exit_reason: ExitReason,
    pub gross_pnl: f64,
    pub fees_paid: f64,
    pub slippage_cost: f64,
    pub net_pnl: f64,
}

/// Fee rates and slippage used by the P&L formulas (spec §4.5). Plumbed in
/// from `EngineConfig` rather than duplicated here.
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    pub taker_fee_rate: f64,
    pub maker_fee_rate: f64,
    pub slippage_rate: f64,
}

/// Per-symbol running counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolStats {
    pub trade_count: u64,
    pub gross_pnl: f64,
    pub wins: u64,
    pub losses: u64,
    pub last_entry_time: Option<i64>,
}

/// A point-in-time, computable-on-demand view of ledger health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub account_equity: f64,
    pub realized_net_pnl: f64,
    pub total_return_pct: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub open_position_count: usize,
    pub trades_today: u64,
    pub total_fees_paid: f64,
    pub unrealized_pnl: f64,
}

/// Two open-position slots per symbol: at most one LONG, one SHORT.
#[derive(Debug, Clone, Default)]
struct SymbolSlots {
    long: Option<Position>,
    short: Option<Position>,
}

/// Owns equity, open positions, the closed-trade log, and per-symbol stats.
/// A single mutex/actor wraps this in production; the type itself has no
/// internal locking so tests can exercise it directly.
pub struct Ledger {
    initial_equity: f64,
    account_equity: f64,
    peak_equity: f64,
    open_positions: HashMap<String, SymbolSlots>,
    closed_trades: Vec<Trade>,
    per_symbol_stats: HashMap<String, SymbolStats>,
    total_fees_paid: f64,
}

impl Ledger {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            initial_equity,
            account_equity: initial_equity,
            peak_equity: initial_equity,
            open_positions: HashMap::new(),
            closed_trades: Vec::new(),
            per_symbol_stats: HashMap::new(),
            total_fees_paid: 0.0,
        }
    }

    pub fn account_equity(&self) -> f64 {
        self.account_equity
    }

    pub fn open_position_for(&self, symbol: &str, side: Side) -> Option<&Position> {
        let slots = self.open_positions.get(symbol)?;
        match side {
            Side::Long => slots.long.as_ref(),
            Side::Short => slots.short.as_ref(),
        }
    }

    pub fn has_any_open(&self, symbol: &str) -> bool {
        self.open_positions
            .get(symbol)
            .map(|s| s.long.is_some() || s.short.is_some())
            .unwrap_or(false)
    }

    pub fn last_entry_time(&self, symbol: &str) -> Option<i64> {
        self.per_symbol_stats.get(symbol)?.last_entry_time
    }

    /// Open a position. The ledger enforces invariant 2: never two same-side
    /// positions open for a symbol at once.
    pub fn open_position(
        &mut self,
        symbol: &str,
        side: Side,
        entry_price: f64,
        entry_time: i64,
        quantity: f64,
        leverage: u32,
        signal_id: &str,
    ) -> &Position {
        let position = Position {
            position_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            entry_price,
            entry_time,
            quantity,
            leverage,
            extreme_favorable_price: entry_price,
            current_stop_price: entry_price,
            opened_by_signal_id: signal_id.to_string(),
        };

        let slots = self.open_positions.entry(symbol.to_string()).or_default();
        let slot = match side {
            Side::Long => &mut slots.long,
            Side::Short => &mut slots.short,
        };
        assert!(
            slot.is_none(),
            "invariant violation: {symbol} already has an open {side} position"
        );

        info!(symbol, %side, entry_price, quantity, "position opened");
        *slot = Some(position);

        let stats = self.per_symbol_stats.entry(symbol.to_string()).or_default();
        stats.last_entry_time = Some(entry_time);

        slot.as_ref().unwrap()
    }

    /// Update the tracked `extreme_favorable_price` / `current_stop_price`
    /// for an open position — called each tick before the trailing-stop
    /// evaluation decides whether to close it.
    pub fn update_stop(&mut self, symbol: &str, side: Side, extreme: f64, stop: f64) {
        if let Some(slots) = self.open_positions.get_mut(symbol) {
            let slot = match side {
                Side::Long => &mut slots.long,
                Side::Short => &mut slots.short,
            };
            if let Some(position) = slot {
                position.extreme_favorable_price = extreme;
                position.current_stop_price = stop;
            }
        }
    }

    /// Close an open position, computing fee/slippage-aware net P&L and
    /// updating equity. Returns the resulting `Trade`.
    pub fn close_position(
        &mut self,
        symbol: &str,
        side: Side,
        exit_price: f64,
        exit_time: i64,
        exit_reason: ExitReason,
        fees: FeeSchedule,
        is_limit_fill: bool,
    ) -> Trade {
        let slots = self
            .open_positions
            .get_mut(symbol)
            .expect("close_position called for symbol with no open positions");
        let slot = match side {
            Side::Long => &mut slots.long,
            Side::Short => &mut slots.short,
        };
        let position = slot
            .take()
            .expect("close_position called for side with no open position");

        let slip = fees.slippage_rate;
        let gross_pnl = match side {
            Side::Long => {
                (exit_price * (1.0 - slip) - position.entry_price * (1.0 + slip))
                    * position.quantity
                    * position.leverage as f64
            }
            Side::Short => {
                (position.entry_price * (1.0 - slip) - exit_price * (1.0 + slip))
                    * position.quantity
                    * position.leverage as f64
            }
        };

        let fee_rate = if is_limit_fill { fees.maker_fee_rate } else { fees.taker_fee_rate };
        let fees_paid = (position.entry_price + exit_price) * position.quantity * fee_rate;
        let net_pnl = gross_pnl - fees_paid;

        self.account_equity += net_pnl;
        self.peak_equity = self.peak_equity.max(self.account_equity);
        self.total_fees_paid += fees_paid;

        let stats = self.per_symbol_stats.entry(symbol.to_string()).or_default();
        stats.trade_count += 1;
        stats.gross_pnl += gross_pnl;
        if net_pnl >= 0.0 {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }

        let trade = Trade {
            position_id: position.position_id,
            symbol: symbol.to_string(),
            side,
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            quantity: position.quantity,
            leverage: position.leverage,
            exit_price,
            exit_time,
            exit_reason,
            gross_pnl,
            fees_paid,
            slippage_cost: 0.0, // folded into gross_pnl, per spec §3 Trade invariant
            net_pnl,
        };

        info!(
            symbol,
            %side,
            %exit_reason,
            net_pnl,
            account_equity = self.account_equity,
            "position closed"
        );

        self.closed_trades.push(trade.clone());
        trade
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    pub fn total_fees_paid(&self) -> f64 {
        self.total_fees_paid
    }

    pub fn per_symbol_stats(&self, symbol: &str) -> Option<&SymbolStats> {
        self.per_symbol_stats.get(symbol)
    }

    /// All currently open positions across every symbol, for the
    /// open-position snapshot persisted on each change (spec §6).
    pub fn all_open_positions(&self) -> Vec<Position> {
        self.open_positions
            .values()
            .flat_map(|slots| [&slots.long, &slots.short].into_iter().flatten())
            .cloned()
            .collect()
    }

    /// Compute a snapshot, marking open positions to `mark_price` for the
    /// unrealized component. Grounded on the journal-stats aggregation idiom
    /// (win rate / profit factor from closed trades), generalized to a
    /// two-sided ledger instead of one side.
    pub fn performance_snapshot(&self, mark_prices: &HashMap<String, f64>) -> PerformanceSnapshot {
        let total_trades = self.closed_trades.len();
        let wins = self.closed_trades.iter().filter(|t| t.net_pnl > 0.0).count();
        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        };

        let gross_profit: f64 = self
            .closed_trades
            .iter()
            .map(|t| t.net_pnl)
            .filter(|&p| p > 0.0)
            .sum();
        let gross_loss: f64 = self
            .closed_trades
            .iter()
            .map(|t| t.net_pnl)
            .filter(|&p| p < 0.0)
            .map(f64::abs)
            .sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let realized_net_pnl: f64 = self.closed_trades.iter().map(|t| t.net_pnl).sum();
        let total_return_pct = if self.initial_equity > 0.0 {
            (self.account_equity - self.initial_equity) / self.initial_equity * 100.0
        } else {
            0.0
        };
        let max_drawdown_pct = if self.peak_equity > 0.0 {
            (self.peak_equity - self.account_equity) / self.peak_equity * 100.0
        } else {
            0.0
        };

        let mut unrealized_pnl = 0.0;
        let mut open_position_count = 0;
        for slots in self.open_positions.values() {
            for position in [&slots.long, &slots.short].into_iter().flatten() {
                open_position_count += 1;
                if let Some(&mark) = mark_prices.get(&position.symbol) {
                    unrealized_pnl += match position.side {
                        Side::Long => (mark - position.entry_price) * position.quantity * position.leverage as f64,
                        Side::Short => (position.entry_price - mark) * position.quantity * position.leverage as f64,
                    };
                }
            }
        }

        let today = Utc::now().date_naive();
        let trades_today = self
            .closed_trades
            .iter()
            .filter(|t| {
                chrono::DateTime::from_timestamp_millis(t.exit_time)
                    .map(|dt| dt.date_naive() == today)
                    .unwrap_or(false)
            })
            .count() as u64;

        PerformanceSnapshot {
            account_equity: self.account_equity,
            realized_net_pnl,
            total_return_pct,
            win_rate,
            profit_factor,
            max_drawdown_pct,
            open_position_count,
            trades_today,
            total_fees_paid: self.total_fees_paid,
            unrealized_pnl,
        }
    }
}
