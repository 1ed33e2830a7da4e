// =============================================================================
// Persistence — closed-trade log (append-only) and open-position snapshot
// =============================================================================
//
// Exactly two items are persisted (spec §6): the closed-trade log, appended
// to as JSON Lines so a crash mid-write loses at most the last unflushed
// record, and the open-position snapshot, which is overwritten wholesale on
// each change using an atomic tmp + rename write. Tick data is never
// persisted here.
// =============================================================================

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::ledger::{Ledger, Position, Trade};

/// File paths for the two persisted artifacts (spec §6). Cheap to clone and
/// share across symbol workers — each write is independently atomic.
#[derive(Debug, Clone)]
pub struct PersistencePaths {
    pub closed_trade_log: std::path::PathBuf,
    pub open_positions_snapshot: std::path::PathBuf,
}

impl PersistencePaths {
    pub fn new(closed_trade_log: impl Into<std::path::PathBuf>, open_positions_snapshot: impl Into<std::path::PathBuf>) -> Self {
        Self {
            closed_trade_log: closed_trade_log.into(),
            open_positions_snapshot: open_positions_snapshot.into(),
        }
    }

    pub fn record_close(&self, trade: &Trade) -> Result<()> {
        append_closed_trade(&self.closed_trade_log, trade)
    }

    pub fn record_open_positions(&self, ledger: &Ledger) -> Result<()> {
        save_open_positions(&self.open_positions_snapshot, &ledger.all_open_positions())
    }
}

/// Append one closed trade as a single JSON line. Opens in append mode so
/// concurrent appends from a single ledger-owning task never interleave.
pub fn append_closed_trade(path: impl AsRef<Path>, trade: &Trade) -> Result<()> {
    let path = path.as_ref();
    let line = serde_json::to_string(trade).context("failed to serialise closed trade")?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open closed-trade log at {}", path.display()))?;

    writeln!(file, "{line}")
        .with_context(|| format!("failed to append closed trade to {}", path.display()))?;
    Ok(())
}

/// Overwrite the open-position snapshot with the current full set, using an
/// atomic tmp + rename so a crash mid-write cannot corrupt the file the next
/// resume reads from.
pub fn save_open_positions(path: impl AsRef<Path>, positions: &[Position]) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(positions)
        .context("failed to serialise open-position snapshot")?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write tmp snapshot to {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename tmp snapshot to {}", path.display()))?;
    Ok(())
}

/// Load a previously saved open-position snapshot, for resume on restart.
/// Absence of the file is not an error — a fresh engine has nothing to
/// resume.
pub fn load_open_positions(path: impl AsRef<Path>) -> Result<Vec<Position>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read open-position snapshot from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse open-position snapshot from {}", path.display()))
}

/// Read every line of the closed-trade log back into `Trade` records, for
/// offline reporting or backtest verification. Skips (and does not fail on)
/// any trailing partial line left by a crash mid-append.
pub fn load_closed_trades(path: impl AsRef<Path>) -> Result<Vec<Trade>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read closed-trade log from {}", path.display()))?;

    let mut trades = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(trade) => trades.push(trade),
            Err(_) => break, // a trailing partial line from a crashed append
        }
    }
    Ok(trades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitReason, Side};

    fn sample_trade(net_pnl: f64) -> Trade {
        Trade {
            position_id: "pos-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            entry_time: 0,
            quantity: 1.0,
            leverage: 1,
            exit_price: 101.0,
            exit_time: 1,
            exit_reason: ExitReason::SignalClose,
            gross_pnl: net_pnl,
            fees_paid: 0.0,
            slippage_cost: 0.0,
            net_pnl,
        }
    }

    fn sample_position() -> Position {
        Position {
            position_id: "pos-2".to_string(),
            symbol: "ETHUSDT".to_string(),
            side: Side::Short,
            entry_price: 200.0,
            entry_time: 0,
            quantity: 2.0,
            leverage: 5,
            extreme_favorable_price: 198.0,
            current_stop_price: 204.0,
            opened_by_signal_id: "sig-1".to_string(),
        }
    }

    #[test]
    fn append_then_load_round_trips() {
        let path = std::env::temp_dir().join("squall_trades_test.jsonl");
        std::fs::remove_file(&path).ok();

        append_closed_trade(&path, &sample_trade(1.0)).unwrap();
        append_closed_trade(&path, &sample_trade(-2.0)).unwrap();

        let loaded = load_closed_trades(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].net_pnl, 1.0);
        assert_eq!(loaded[1].net_pnl, -2.0);
    }

    #[test]
    fn missing_closed_trade_log_yields_empty() {
        let path = std::env::temp_dir().join("squall_missing_trades_test.jsonl");
        std::fs::remove_file(&path).ok();
        assert!(load_closed_trades(&path).unwrap().is_empty());
    }

    #[test]
    fn open_positions_snapshot_round_trips() {
        let path = std::env::temp_dir().join("squall_open_positions_test.json");
        std::fs::remove_file(&path).ok();

        save_open_positions(&path, &[sample_position()]).unwrap();
        let loaded = load_open_positions(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "ETHUSDT");
    }

    #[test]
    fn missing_open_positions_snapshot_yields_empty() {
        let path = std::env::temp_dir().join("squall_missing_positions_test.json");
        std::fs::remove_file(&path).ok();
        assert!(load_open_positions(&path).unwrap().is_empty());
    }

    #[test]
    fn trailing_partial_line_is_skipped_not_fatal() {
        let path = std::env::temp_dir().join("squall_partial_trades_test.jsonl");
        std::fs::remove_file(&path).ok();
        append_closed_trade(&path, &sample_trade(3.0)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"incomplete").unwrap();

        let loaded = load_closed_trades(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.len(), 1);
    }
}
