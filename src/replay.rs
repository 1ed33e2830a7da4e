// =============================================================================
// Replay — deterministic backtest harness
// =============================================================================
//
// Drives a fixed, pre-recorded tick sequence per symbol straight through a
// `SymbolEngine`, with no channel or scheduler in between — replay does not
// need the live concurrency model's bounded/drop-oldest channel, only its
// determinism. Same input ticks, same coin params, same config always
// produces the same closed-trade log (spec §8 Scenario 7).
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{CoinParamsTable, EngineConfig};
use crate::engine::SymbolEngine;
use crate::execution::ExecutionGateway;
use crate::ledger::{Ledger, Trade};
use crate::types::Tick;

/// Feeds `ticks_by_symbol` through one `SymbolEngine` per symbol, in order,
/// against a single shared ledger. Returns the resulting closed-trade log.
pub async fn run_replay<G: ExecutionGateway + 'static>(
    config: Arc<EngineConfig>,
    params: &CoinParamsTable,
    gateway: Arc<G>,
    ticks_by_symbol: HashMap<String, Vec<Tick>>,
) -> Vec<Trade> {
    let ledger = Arc::new(Mutex::new(Ledger::new(config.starting_equity)));

    for (symbol, ticks) in ticks_by_symbol {
        let Some(coin_params) = params.get(&symbol).cloned() else {
            continue;
        };
        let mut engine = SymbolEngine::new(
            symbol.clone(),
            config.clone(),
            coin_params,
            gateway.clone(),
            ledger.clone(),
        );
        for tick in ticks {
            engine.process_tick(tick).await;
        }
    }

    let trades = ledger.lock().closed_trades().to_vec();
    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoinParams, StrategyVariant};
    use crate::execution::PaperExecutionGateway;
    use crate::types::TradingMode;

    fn synthetic_ticks(n: i64) -> Vec<Tick> {
        (0..n)
            .map(|i| {
                let wobble = if i % 2 == 0 { 0.5 } else { -0.5 };
                Tick::new(i * 100, 100.0 + wobble, 1.0, false)
            })
            .collect()
    }

    #[tokio::test]
    async fn replay_is_deterministic_across_runs() {
        let config = Arc::new(
            EngineConfig { trading_mode: TradingMode::Live, ..EngineConfig::default() }.for_replay(),
        );
        let mut table = CoinParamsTable::default();
        table.insert(CoinParams::with_variant_defaults("BTCUSDT", StrategyVariant::Aggressive));
        let gateway = Arc::new(PaperExecutionGateway::new(0.0001));

        let mut ticks_by_symbol = HashMap::new();
        ticks_by_symbol.insert("BTCUSDT".to_string(), synthetic_ticks(250));

        let trades_a = run_replay(config.clone(), &table, gateway.clone(), ticks_by_symbol.clone()).await;
        let trades_b = run_replay(config, &table, gateway, ticks_by_symbol).await;

        assert_eq!(trades_a.len(), trades_b.len());
        for (a, b) in trades_a.iter().zip(trades_b.iter()) {
            assert_eq!(a.entry_price, b.entry_price);
            assert_eq!(a.exit_price, b.exit_price);
            assert_eq!(a.net_pnl, b.net_pnl);
        }
    }

    #[tokio::test]
    async fn constant_price_with_no_volatility_produces_zero_trades() {
        let config = Arc::new(
            EngineConfig { trading_mode: TradingMode::Live, ..EngineConfig::default() }.for_replay(),
        );
        let mut table = CoinParamsTable::default();
        table.insert(CoinParams::with_variant_defaults("BTCUSDT", StrategyVariant::Aggressive));
        let gateway = Arc::new(PaperExecutionGateway::new(0.0));

        let flat_ticks: Vec<Tick> = (0..500i64).map(|i| Tick::new(i * 100, 100.0, 1.0, false)).collect();
        let mut ticks_by_symbol = HashMap::new();
        ticks_by_symbol.insert("BTCUSDT".to_string(), flat_ticks);

        let trades = run_replay(config, &table, gateway, ticks_by_symbol).await;
        assert!(trades.is_empty(), "no volatility means no entries means no trades");
    }

    #[tokio::test]
    async fn unknown_symbol_is_skipped_not_fatal() {
        let config = Arc::new(EngineConfig::default().for_replay());
        let table = CoinParamsTable::default(); // no symbols registered
        let gateway = Arc::new(PaperExecutionGateway::new(0.0));

        let mut ticks_by_symbol = HashMap::new();
        ticks_by_symbol.insert("UNKNOWNUSDT".to_string(), synthetic_ticks(10));

        let trades = run_replay(config, &table, gateway, ticks_by_symbol).await;
        assert!(trades.is_empty());
    }
}
