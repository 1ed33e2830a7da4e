// =============================================================================
// Tick sources — external collaborators that emit an ordered Tick stream
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use crate::market_data::TickChannel;
use crate::types::Tick;

/// A source of ticks for one symbol. The engine does not reconnect itself —
/// implementations own their own reconnect loop and may duplicate a tick
/// across a reconnect boundary; the supervisor deduplicates downstream.
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Run until the stream ends or an unrecoverable error occurs, pushing
    /// ticks into `sink`. Returns when the stream is exhausted (replay) or
    /// disconnects (live) so the caller can decide whether to reconnect.
    async fn run(&self, symbol: &str, sink: Arc<TickChannel>) -> Result<()>;
}

/// Connects to Binance's USD-M futures aggTrade stream for one symbol.
pub struct BinanceAggTradeSource;

impl BinanceAggTradeSource {
    pub fn new() -> Self {
        Self
    }

    fn stream_url(symbol: &str) -> String {
        format!(
            "wss://fstream.binance.com/ws/{}@aggTrade",
            symbol.to_lowercase()
        )
    }
}

impl Default for BinanceAggTradeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TickSource for BinanceAggTradeSource {
    async fn run(&self, symbol: &str, sink: Arc<TickChannel>) -> Result<()> {
        let url = Self::stream_url(symbol);
        info!(url = %url, symbol = %symbol, "connecting to futures aggTrade stream");

        let (ws_stream, _response) = connect_async(&url)
            .await
            .context("failed to connect to aggTrade WebSocket")?;

        info!(symbol = %symbol, "aggTrade WebSocket connected");
        let (_write, mut read) = ws_stream.split();

        loop {
            if sink.is_closed() {
                warn!(symbol = %symbol, "tick sink closed, stopping stream");
                return Ok(());
            }
            match read.next().await {
                Some(Ok(msg)) => {
                    if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                        match parse_agg_trade(&text) {
                            Ok(tick) => sink.send(tick),
                            Err(e) => warn!(error = %e, "failed to parse aggTrade message"),
                        }
                    }
                }
                Some(Err(e)) => {
                    error!(symbol = %symbol, error = %e, "aggTrade WebSocket read error");
                    return Err(e.into());
                }
                None => {
                    warn!(symbol = %symbol, "aggTrade WebSocket stream ended");
                    return Ok(());
                }
            }
        }
    }
}

/// Parse a futures aggTrade message: `{"p":"...","q":"...","T":169...,"m":bool}`.
fn parse_agg_trade(text: &str) -> Result<Tick> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse aggTrade JSON")?;

    let price: f64 = root["p"]
        .as_str()
        .context("missing field p")?
        .parse()
        .context("failed to parse price")?;
    let quantity: f64 = root["q"]
        .as_str()
        .context("missing field q")?
        .parse()
        .context("failed to parse quantity")?;
    let timestamp_ms = root["T"].as_i64().context("missing field T")?;
    let is_buyer_maker = root["m"].as_bool().context("missing field m")?;

    Ok(Tick::new(timestamp_ms, price, quantity, is_buyer_maker))
}

/// Replays a pre-recorded, ordered tick stream. Used by the replay/backtest
/// harness and by determinism tests. The supervisor sizes the replay channel
/// to the full tick count so nothing is ever dropped, preserving the exact
/// same trade log across repeated runs.
pub struct ReplayTickSource {
    ticks: Vec<Tick>,
}

impl ReplayTickSource {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self { ticks }
    }
}

#[async_trait]
impl TickSource for ReplayTickSource {
    async fn run(&self, symbol: &str, sink: Arc<TickChannel>) -> Result<()> {
        if sink.is_closed() {
            warn!(symbol = %symbol, "replay sink closed early");
            return Ok(());
        }
        for tick in &self.ticks {
            sink.send(*tick);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_is_futures_aggtrade() {
        let url = BinanceAggTradeSource::stream_url("BTCUSDT");
        assert_eq!(url, "wss://fstream.binance.com/ws/btcusdt@aggTrade");
    }

    #[test]
    fn parse_agg_trade_ok() {
        let json = r#"{"e":"aggTrade","s":"BTCUSDT","p":"37000.50","q":"0.123","T":1700000000000,"m":true}"#;
        let tick = parse_agg_trade(json).expect("should parse");
        assert!((tick.price - 37000.50).abs() < f64::EPSILON);
        assert!((tick.volume - 0.123).abs() < f64::EPSILON);
        assert_eq!(tick.timestamp_ms, 1700000000000);
        assert!(tick.is_buyer_maker);
    }

    #[tokio::test]
    async fn replay_source_sends_all_ticks_in_order() {
        let ticks = vec![
            Tick::new(0, 100.0, 1.0, false),
            Tick::new(1, 101.0, 1.0, false),
            Tick::new(2, 102.0, 1.0, true),
        ];
        let source = ReplayTickSource::new(ticks.clone());
        let channel = Arc::new(TickChannel::new(16));
        source.run("BTCUSDT", channel.clone()).await.unwrap();
        channel.close();

        let mut received = Vec::new();
        while let Some(tick) = channel.try_recv() {
            received.push(tick);
        }
        assert_eq!(received.len(), 3);
        assert_eq!(received[0].price, 100.0);
        assert_eq!(received[2].price, 102.0);
    }
}
