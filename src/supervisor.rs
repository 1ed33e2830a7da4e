// =============================================================================
// Supervisor — spawns and owns every per-symbol worker
// =============================================================================
//
// One worker task per symbol, each wired to its own tick channel and exactly
// one `SymbolEngine`. The ledger is the only state shared across workers; it
// is wrapped once here and handed out as a clone of the `Arc`. Shutdown is a
// broadcast: every worker finishes its current tick, then exits (spec §5).
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{CoinParamsTable, EngineConfig};
use crate::engine::SymbolEngine;
use crate::execution::ExecutionGateway;
use crate::ledger::Ledger;
use crate::market_data::{TickChannel, TickSource};
use crate::persistence::PersistencePaths;
use crate::types::Tick;

/// Owns every symbol worker's `JoinHandle` and the shutdown sender. Dropping
/// or calling `shutdown` causes all workers to drain and exit.
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl Supervisor {
    /// Spawn one worker per symbol in `params.symbols()`. `tick_source` and
    /// `gateway` are shared across all workers (both are `Send + Sync`).
    pub fn spawn<T, G>(
        config: Arc<EngineConfig>,
        params: &CoinParamsTable,
        tick_source: Arc<T>,
        gateway: Arc<G>,
        persistence: Option<PersistencePaths>,
    ) -> Self
    where
        T: TickSource + 'static,
        G: ExecutionGateway + 'static,
    {
        let ledger = Arc::new(Mutex::new(Ledger::new(config.starting_equity)));
        let (shutdown_tx, _) = watch::channel(false);
        let mut workers = Vec::new();

        for symbol in params.symbols() {
            let symbol = symbol.to_string();
            let Some(coin_params) = params.get(&symbol).cloned() else {
                continue;
            };

            // Replay mode wants a channel that never drops for determinism;
            // a million-tick bound stands in for "unbounded" without an
            // actually-unbounded queue backing a long-running process.
            let channel_capacity = if config.replay {
                1_000_000
            } else {
                config.tick_channel_capacity
            };
            let channel = Arc::new(TickChannel::new(channel_capacity));

            let source = tick_source.clone();
            let sym_for_source = symbol.clone();
            let chan_for_source = channel.clone();
            tokio::spawn(async move {
                if let Err(err) = source.run(&sym_for_source, chan_for_source.clone()).await {
                    warn!(symbol = %sym_for_source, %err, "tick source exited with error");
                }
                chan_for_source.close();
            });

            let mut engine = SymbolEngine::new(
                symbol.clone(),
                config.clone(),
                coin_params,
                gateway.clone(),
                ledger.clone(),
            );
            if let Some(paths) = &persistence {
                engine = engine.with_persistence(paths.clone());
            }

            let shutdown_rx = shutdown_tx.subscribe();
            let handle = tokio::spawn(run_worker(symbol, engine, channel, shutdown_rx));
            workers.push(handle);
        }

        info!(count = workers.len(), "symbol workers spawned");
        Self { shutdown_tx, workers, ledger }
    }

    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        self.ledger.clone()
    }

    /// Signal every worker to drain its current tick and exit, then wait for
    /// all of them to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        info!("all symbol workers shut down");
    }
}

async fn run_worker<G: ExecutionGateway>(
    symbol: String,
    mut engine: SymbolEngine<G>,
    channel: Arc<TickChannel>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(symbol = %symbol, "worker started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    channel.close();
                    info!(symbol = %symbol, "shutdown observed, worker exiting");
                    break;
                }
            }
            maybe_tick = channel.recv() => {
                match maybe_tick {
                    Some(tick) => engine.process_tick(tick).await,
                    None => {
                        info!(symbol = %symbol, "tick channel closed, worker exiting");
                        break;
                    }
                }
            }
        }
    }
    let dropped = channel.dropped_count();
    if dropped > 0 {
        warn!(symbol = %symbol, dropped, "ticks dropped by backpressure during this worker's lifetime");
    }
    info!(symbol = %symbol, dropped_out_of_order = engine.dropped_out_of_order(), dropped_by_backpressure = dropped, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoinParams, StrategyVariant};
    use crate::execution::PaperExecutionGateway;
    use crate::market_data::ReplayTickSource;

    fn params_table() -> CoinParamsTable {
        let mut table = CoinParamsTable::default();
        table.insert(CoinParams::with_variant_defaults("BTCUSDT", StrategyVariant::Aggressive));
        table
    }

    #[tokio::test]
    async fn supervisor_spawns_one_worker_per_symbol_and_shuts_down_cleanly() {
        let config = Arc::new(EngineConfig::default().for_replay());
        let table = params_table();
        let ticks = vec![Tick::new(0, 100.0, 1.0, false), Tick::new(1, 100.5, 1.0, false)];
        let source = Arc::new(ReplayTickSource::new(ticks));
        let gateway = Arc::new(PaperExecutionGateway::new(0.0001));

        let supervisor = Supervisor::spawn(config, &table, source, gateway, None);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let equity = supervisor.ledger().lock().account_equity();
        assert_eq!(equity, 10_000.0);
        supervisor.shutdown().await;
    }
}
