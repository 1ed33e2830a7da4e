// =============================================================================
// squall-engine — Main Entry Point
// =============================================================================
//
// The engine starts Paused (spec §3 `TradingMode`); an operator must flip a
// config field and restart to go Live. Ticks still flow and indicators/stops
// still update while paused — only order placement is gated.
// =============================================================================

mod config;
mod engine;
mod execution;
mod indicators;
mod ledger;
mod market_data;
mod persistence;
mod replay;
mod signals;
mod supervisor;
mod trailing_stop;
mod types;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CoinParamsTable, EngineConfig};
use crate::execution::PaperExecutionGateway;
use crate::market_data::BinanceAggTradeSource;
use crate::supervisor::Supervisor;

const ENGINE_CONFIG_PATH: &str = "engine_config.json";
const COIN_PARAMS_PATH: &str = "coin_params.json";
const CLOSED_TRADE_LOG_PATH: &str = "closed_trades.jsonl";
const OPEN_POSITIONS_PATH: &str = "open_positions.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("squall-engine starting up");

    let engine_config = EngineConfig::load(ENGINE_CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine config, using defaults");
        EngineConfig::default()
    });

    let coin_params = CoinParamsTable::load(COIN_PARAMS_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load coin params, no symbols will trade");
        CoinParamsTable::default()
    });

    info!(
        trading_mode = %engine_config.trading_mode,
        starting_equity = engine_config.starting_equity,
        symbol_count = coin_params.symbols().count(),
        "configuration loaded"
    );

    let resumed = persistence::load_open_positions(OPEN_POSITIONS_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load open-position snapshot, starting flat");
        Vec::new()
    });
    if !resumed.is_empty() {
        warn!(
            count = resumed.len(),
            "open positions found from a previous run — resume/flatten is a manual operator step"
        );
    }

    let config = Arc::new(engine_config);
    let tick_source = Arc::new(BinanceAggTradeSource::new());
    let gateway = Arc::new(PaperExecutionGateway::new(config.slippage_rate));
    let persistence_paths = persistence::PersistencePaths::new(CLOSED_TRADE_LOG_PATH, OPEN_POSITIONS_PATH);

    let supervisor = Supervisor::spawn(
        config.clone(),
        &coin_params,
        tick_source,
        gateway,
        Some(persistence_paths),
    );

    info!("all symbol workers running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, draining workers");

    let ledger = supervisor.ledger();
    supervisor.shutdown().await;

    {
        // Closed trades and the open-position snapshot are already persisted
        // incrementally by each symbol worker as positions close, so there is
        // nothing left to flush here beyond a final summary.
        let ledger = ledger.lock();
        let snapshot = ledger.performance_snapshot(&std::collections::HashMap::new());
        info!(
            account_equity = snapshot.account_equity,
            realized_net_pnl = snapshot.realized_net_pnl,
            total_return_pct = snapshot.total_return_pct,
            win_rate = snapshot.win_rate,
            "final performance snapshot"
        );
    }

    info!("squall-engine shut down complete");
    Ok(())
}
