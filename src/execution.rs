// =============================================================================
// Execution gateway — external collaborator consumed at its trait interface
// =============================================================================
//
// The gateway accepts order intents and returns fills; it does not know about
// positions, P&L, or stops. Only one concrete adapter ships here —
// `PaperExecutionGateway`, the in-process synthetic-fill gateway for
// paper/backtest mode. A live-exchange implementation is intentionally not
// provided: real exchange authentication is out of scope, and a stub with no
// caller would be indistinguishable from dead code.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::warn;

use crate::types::Side;

/// Typed error taxonomy for order placement (spec §7).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayErrorKind {
    #[error("transient gateway error: {0}")]
    Transient(String),
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("limit order did not fill before its deadline")]
    UnfilledTimeout,
    #[error("order placement exceeded its deadline")]
    Timeout,
    #[error("retries exhausted: {0}")]
    Exhausted(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub fill_price: f64,
    pub timestamp_ms: i64,
    pub is_limit_fill: bool,
}

/// Capability set required from the external gateway (spec §4.6).
///
/// `reference_price` is the contemporaneous tick price at order time — the
/// paper gateway fills against it directly; a real exchange implementation
/// would ignore it and read its own order book instead.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
        reference_price: f64,
        timestamp_ms: i64,
    ) -> Result<Fill, GatewayErrorKind>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
        limit_price: f64,
        reference_price: f64,
        timestamp_ms: i64,
    ) -> Result<Fill, GatewayErrorKind>;
}

/// Retry a transient-failure-prone call with exponential backoff, bounded to
/// 3 attempts (spec §7). Only `GatewayErrorKind::Transient` is retried.
pub async fn with_retry<F, Fut>(mut attempt: F) -> Result<Fill, GatewayErrorKind>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Fill, GatewayErrorKind>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_err = GatewayErrorKind::Exhausted("no attempts made".to_string());

    for n in 0..MAX_ATTEMPTS {
        match attempt().await {
            Ok(fill) => return Ok(fill),
            Err(GatewayErrorKind::Transient(msg)) => {
                last_err = GatewayErrorKind::Transient(msg.clone());
                let base_ms = 100u64 * 2u64.pow(n);
                let jitter_ms: u64 = rand::thread_rng().gen_range(0..=50);
                warn!(attempt = n + 1, backoff_ms = base_ms + jitter_ms, error = %msg, "transient gateway error, retrying");
                tokio::time::sleep(Duration::from_millis(base_ms + jitter_ms)).await;
            }
            Err(other) => return Err(other),
        }
    }
    Err(GatewayErrorKind::Exhausted(last_err.to_string()))
}

/// In-process synthetic-fill gateway for paper/backtest/replay mode. Fills at
/// `tick_price * (1 +/- slip)`; limit orders additionally check the crossing
/// condition before filling, returning `UnfilledTimeout` when the tick does
/// not cross the requested limit price.
pub struct PaperExecutionGateway {
    slippage_rate: f64,
}

impl PaperExecutionGateway {
    pub fn new(slippage_rate: f64) -> Self {
        Self { slippage_rate }
    }

    fn slip_adjusted_price(&self, side: Side, tick_price: f64) -> f64 {
        match side {
            // Slippage always works against the taker: buying costs a little
            // more, selling realizes a little less.
            Side::Long => tick_price * (1.0 + self.slippage_rate),
            Side::Short => tick_price * (1.0 - self.slippage_rate),
        }
    }

    /// Whether a limit order at `limit_price` would have been crossed by
    /// `tick_price` for the given side.
    fn crosses(side: Side, limit_price: f64, tick_price: f64) -> bool {
        match side {
            Side::Long => tick_price <= limit_price,
            Side::Short => tick_price >= limit_price,
        }
    }
}

#[async_trait]
impl ExecutionGateway for PaperExecutionGateway {
    async fn place_market_order(
        &self,
        _symbol: &str,
        side: Side,
        _quantity: f64,
        reference_price: f64,
        timestamp_ms: i64,
    ) -> Result<Fill, GatewayErrorKind> {
        Ok(Fill {
            fill_price: self.slip_adjusted_price(side, reference_price),
            timestamp_ms,
            is_limit_fill: false,
        })
    }

    async fn place_limit_order(
        &self,
        _symbol: &str,
        side: Side,
        _quantity: f64,
        limit_price: f64,
        reference_price: f64,
        timestamp_ms: i64,
    ) -> Result<Fill, GatewayErrorKind> {
        if Self::crosses(side, limit_price, reference_price) {
            Ok(Fill {
                fill_price: self.slip_adjusted_price(side, reference_price),
                timestamp_ms,
                is_limit_fill: true,
            })
        } else {
            Err(GatewayErrorKind::UnfilledTimeout)
        }
    }
}
