// =============================================================================
// SymbolEngine — per-symbol state machine driving the fixed tick pipeline
// =============================================================================
//
// Owns everything touched by exactly one worker: the tick buffer, the two
// trailing stops, and the signal-check cadence counter. The ledger is the one
// piece of shared state (equity, fee counter, closed-trade log); it is
// reached through a short-lived lock, never held across an `await`.
// =============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::config::{CoinParams, EngineConfig};
use crate::execution::{with_retry, ExecutionGateway, Fill, GatewayErrorKind};
use crate::indicators;
use crate::ledger::{FeeSchedule, Ledger};
use crate::market_data::TickBuffer;
use crate::persistence::PersistencePaths;
use crate::signals::{OpenSlots, Signal, SignalGenerator};
use crate::trailing_stop::{StopOutcome, TrailingStop};
use crate::types::{EngineState, ExitReason, Side, Tick, TradingMode};

/// The single symbol-worker state machine. `G` is the execution gateway;
/// generic rather than `dyn` since a worker is bound to exactly one gateway
/// implementation for its whole lifetime.
pub struct SymbolEngine<G: ExecutionGateway> {
    symbol: String,
    config: Arc<EngineConfig>,
    params: CoinParams,
    gateway: Arc<G>,
    ledger: Arc<Mutex<Ledger>>,
    buffer: TickBuffer,
    state: EngineState,
    ticks_since_signal_check: u64,
    long_stop: Option<TrailingStop>,
    short_stop: Option<TrailingStop>,
    last_tick: Option<(i64, f64, f64)>,
    dropped_out_of_order: u64,
    persistence: Option<PersistencePaths>,
}

impl<G: ExecutionGateway> SymbolEngine<G> {
    pub fn new(
        symbol: impl Into<String>,
        config: Arc<EngineConfig>,
        params: CoinParams,
        gateway: Arc<G>,
        ledger: Arc<Mutex<Ledger>>,
    ) -> Self {
        let capacity = config.tick_buffer_capacity;
        Self {
            symbol: symbol.into(),
            config,
            params,
            gateway,
            ledger,
            buffer: TickBuffer::new(capacity),
            state: EngineState::Idle,
            ticks_since_signal_check: 0,
            long_stop: None,
            short_stop: None,
            last_tick: None,
            dropped_out_of_order: 0,
            persistence: None,
        }
    }

    /// Enable continuous persistence: every closed trade is appended and the
    /// open-position snapshot is overwritten after every change (spec §6).
    pub fn with_persistence(mut self, paths: PersistencePaths) -> Self {
        self.persistence = Some(paths);
        self
    }

    fn persist_after_mutation(&self, closed: Option<&crate::ledger::Trade>) {
        let Some(paths) = &self.persistence else { return };
        let ledger = self.ledger.lock();
        if let Some(trade) = closed {
            if let Err(err) = paths.record_close(trade) {
                warn!(symbol = %self.symbol, %err, "failed to append closed trade");
            }
        }
        if let Err(err) = paths.record_open_positions(&ledger) {
            warn!(symbol = %self.symbol, %err, "failed to save open-position snapshot");
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn dropped_out_of_order(&self) -> u64 {
        self.dropped_out_of_order
    }

    fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            taker_fee_rate: self.config.taker_fee_rate,
            maker_fee_rate: self.config.maker_fee_rate,
            slippage_rate: self.config.slippage_rate,
        }
    }

    /// Triple-based dedup against the buffer's newest tick (spec §6). A tick
    /// whose timestamp is strictly less than the previous one is dropped and
    /// counted rather than processed.
    fn accept(&mut self, tick: Tick) -> bool {
        if let Some((ts, price, volume)) = self.last_tick {
            if tick.timestamp_ms == ts && tick.price == price && tick.volume == volume {
                return false; // exact duplicate, likely a reconnect replay
            }
            if tick.timestamp_ms < ts {
                self.dropped_out_of_order += 1;
                warn!(symbol = %self.symbol, ts = tick.timestamp_ms, prev_ts = ts, "tick out of order, dropped");
                return false;
            }
        }
        self.last_tick = Some((tick.timestamp_ms, tick.price, tick.volume));
        true
    }

    fn snapshot(&self) -> Option<indicators::IndicatorSnapshot> {
        let lookback = self.buffer.since(self.config.lookback_seconds);
        let atr_window = self.buffer.recent(self.buffer.len());
        indicators::compute_snapshot(
            &lookback,
            &atr_window,
            self.config.atr_subwindow,
            self.config.bb_k,
            self.config.bb_epsilon,
        )
    }

    /// Place a market order through the shared transient-retry policy (spec
    /// §7); `reason` is only used in the warning logged if retries exhaust.
    async fn place_market_order_with_retry(
        &self,
        side: Side,
        quantity: f64,
        reference_price: f64,
        timestamp_ms: i64,
    ) -> Result<Fill, GatewayErrorKind> {
        with_retry(|| {
            self.gateway
                .place_market_order(&self.symbol, side, quantity, reference_price, timestamp_ms)
        })
        .await
    }

    fn open_slots(&self) -> OpenSlots {
        OpenSlots {
            long_open: self.long_stop.is_some(),
            short_open: self.short_stop.is_some(),
        }
    }

    fn to_engine_state(&self) -> EngineState {
        match (self.long_stop.is_some(), self.short_stop.is_some()) {
            (true, true) => EngineState::BothOpen,
            (true, false) => EngineState::LongOnly,
            (false, true) => EngineState::ShortOnly,
            (false, false) => EngineState::Idle,
        }
    }

    /// Run the fixed six-step pipeline (spec §4.7) for one incoming tick.
    pub async fn process_tick(&mut self, tick: Tick) {
        if !self.accept(tick) {
            return;
        }

        // Step 1.
        self.buffer.push(tick);

        // Step 2.
        let snapshot = self.snapshot();

        // Step 3: evaluate stops, LONG before SHORT.
        if let Some(snap) = &snapshot {
            self.evaluate_stop(Side::Long, tick, snap.atr_like_vol).await;
            self.evaluate_stop(Side::Short, tick, snap.atr_like_vol).await;
        }
        self.state = self.to_engine_state();

        self.ticks_since_signal_check += 1;

        // Step 4. Entries are cadence-gated (spec §4.3: checked every M
        // ticks), but once a position is open the close rule (§4.3/§4.7
        // step 6) must be able to fire on any tick, not just cadence ticks —
        // otherwise CLOSE_ALL can only ever be reached when nothing is open.
        let positions_open = self.state != EngineState::Idle;
        let cadence_elapsed = self.ticks_since_signal_check >= self.config.signal_cadence;
        let signal = if positions_open || cadence_elapsed {
            if cadence_elapsed {
                self.ticks_since_signal_check = 0;
            }
            match &snapshot {
                Some(snap) => SignalGenerator::evaluate(
                    snap,
                    &self.params,
                    tick.timestamp_ms,
                    self.ledger.lock().last_entry_time(&self.symbol),
                    self.open_slots(),
                ),
                None => Signal::Hold, // IndicatorUndefined -> HOLD, spec §7
            }
        } else {
            Signal::Hold
        };

        // Step 5.
        if let Signal::EntryBoth { .. } = signal {
            if let Some(snap) = &snapshot {
                self.enter_both(tick, snap.atr_like_vol).await;
            }
        }

        // Step 6.
        if let Signal::CloseAll = signal {
            self.close_all(tick, ExitReason::SignalClose).await;
        }

        self.state = self.to_engine_state();
    }

    async fn evaluate_stop(&mut self, side: Side, tick: Tick, atr_like_vol: f64) {
        let stop = match side {
            Side::Long => &mut self.long_stop,
            Side::Short => &mut self.short_stop,
        };
        let Some(trailing) = stop else { return };

        match trailing.update(tick.price, atr_like_vol) {
            StopOutcome::Holding { new_stop } => {
                self.ledger
                    .lock()
                    .update_stop(&self.symbol, side, trailing.extreme_price(), new_stop);
            }
            StopOutcome::Triggered { exit_price, reason } => {
                self.close_one(side, tick, exit_price, reason).await;
            }
        }
    }

    async fn close_one(&mut self, side: Side, tick: Tick, exit_price: f64, reason: ExitReason) {
        if self.config.trading_mode == TradingMode::Paused {
            warn!(symbol = %self.symbol, %side, "trading paused, skipping close order");
            return;
        }

        let fill = self
            .place_market_order_with_retry(side.opposite(), 0.0, exit_price, tick.timestamp_ms)
            .await;

        // The gateway's own `fill_price` already embeds execution slippage
        // (spec §4.6); the ledger's P&L formula (§4.5) applies slip itself
        // from the raw reference price, so the raw `exit_price` — not the
        // gateway's fill price — is what gets recorded here.
        let is_limit_fill = match fill {
            Ok(f) => f.is_limit_fill,
            Err(err) => {
                error!(symbol = %self.symbol, %side, error = %err, "close order failed, position remains open");
                return;
            }
        };

        let trade = self.ledger.lock().close_position(
            &self.symbol,
            side,
            exit_price,
            tick.timestamp_ms,
            reason,
            self.fee_schedule(),
            is_limit_fill,
        );
        self.persist_after_mutation(Some(&trade));

        match side {
            Side::Long => self.long_stop = None,
            Side::Short => self.short_stop = None,
        }
    }

    async fn close_all(&mut self, tick: Tick, reason: ExitReason) {
        if self.long_stop.is_some() {
            let exit_price = tick.price;
            self.close_one(Side::Long, tick, exit_price, reason).await;
        }
        if self.short_stop.is_some() {
            let exit_price = tick.price;
            self.close_one(Side::Short, tick, exit_price, reason).await;
        }
    }

    /// Atomic two-leg entry. If either fill fails (`OrderRejected` or
    /// gateway exhaustion), the other leg is immediately closed at market
    /// rather than left open alone (spec §7 `OrderRejected`).
    async fn enter_both(&mut self, tick: Tick, atr_like_vol: f64) {
        if self.config.trading_mode == TradingMode::Paused {
            warn!(symbol = %self.symbol, "trading paused, skipping entry signal");
            return;
        }

        let equity = self.ledger.lock().account_equity();
        let notional = equity * self.params.position_size_fraction * self.params.leverage as f64;
        let quantity = notional / tick.price;
        let atr_pct = if tick.price > 0.0 { atr_like_vol / tick.price } else { 0.0 };

        let long_fill = self
            .place_market_order_with_retry(Side::Long, quantity, tick.price, tick.timestamp_ms)
            .await;
        let short_fill = self
            .place_market_order_with_retry(Side::Short, quantity, tick.price, tick.timestamp_ms)
            .await;

        match (long_fill, short_fill) {
            (Ok(_), Ok(_)) => {
                // Both legs recorded at the raw reference price, per the
                // same convention as `close_one`: the ledger's P&L formula
                // applies slip itself, so the gateway's already-slipped fill
                // price is not what gets stored.
                let signal_id = uuid::Uuid::new_v4().to_string();
                {
                    let mut ledger = self.ledger.lock();
                    ledger.open_position(
                        &self.symbol,
                        Side::Long,
                        tick.price,
                        tick.timestamp_ms,
                        quantity,
                        self.params.leverage,
                        &signal_id,
                    );
                    ledger.open_position(
                        &self.symbol,
                        Side::Short,
                        tick.price,
                        tick.timestamp_ms,
                        quantity,
                        self.params.leverage,
                        &signal_id,
                    );
                }

                let mut long_stop = TrailingStop::new(
                    Side::Long,
                    tick.price,
                    self.params.hard_stop_atr_multiplier,
                    self.params.min_loss_floor_pct,
                );
                long_stop.initialize(atr_pct);
                let mut short_stop = TrailingStop::new(
                    Side::Short,
                    tick.price,
                    self.params.hard_stop_atr_multiplier,
                    self.params.min_loss_floor_pct,
                );
                short_stop.initialize(atr_pct);
                self.long_stop = Some(long_stop);
                self.short_stop = Some(short_stop);
                self.persist_after_mutation(None);
            }
            (Ok(_), Err(err)) => {
                warn!(symbol = %self.symbol, error = %err, "short leg rejected, unwinding long leg");
                self.unwind_single_fill(Side::Long, tick).await;
            }
            (Err(err), Ok(_)) => {
                warn!(symbol = %self.symbol, error = %err, "long leg rejected, unwinding short leg");
                self.unwind_single_fill(Side::Short, tick).await;
            }
            (Err(long_err), Err(short_err)) => {
                warn!(symbol = %self.symbol, %long_err, %short_err, "both entry legs rejected, no position opened");
            }
        }
    }

    /// Revert a lone successful leg of a failed two-leg entry: the position
    /// was never opened in the ledger, so there is nothing to close there —
    /// this only reverses the gateway fill by placing the opposite order.
    async fn unwind_single_fill(&mut self, filled_side: Side, tick: Tick) {
        let reverse = self
            .place_market_order_with_retry(filled_side.opposite(), 0.0, tick.price, tick.timestamp_ms)
            .await;
        if let Err(err) = reverse {
            error!(symbol = %self.symbol, %filled_side, error = %err, "failed to unwind orphaned entry leg");
        }
    }
}

impl Side {
    fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}
