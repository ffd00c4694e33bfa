use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::StrategyHandle;
use crate::models::Tick;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct AggTrade {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Convert one `aggTrade` payload into a tick
pub fn parse_agg_trade(payload: &str) -> Option<Tick> {
    let trade: AggTrade = serde_json::from_str(payload).ok()?;
    let price = trade.price.parse().ok()?;
    let size = trade.quantity.parse().ok()?;
    Some(Tick::new(price, size, trade.trade_time))
}

/// Streams aggregated trades for one symbol into the strategy
pub struct TradeStream {
    url: String,
    handle: StrategyHandle,
}

impl TradeStream {
    /// # Arguments
    /// * `ws_base` - Websocket root, e.g. `wss://stream.binance.com:9443/ws`
    pub fn new(ws_base: &str, symbol: &str, handle: StrategyHandle) -> Self {
        Self {
            url: format!("{}/{}@aggTrade", ws_base.trim_end_matches('/'), symbol.to_lowercase()),
            handle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and forward ticks, reconnecting after every disconnect
    ///
    /// Returns once the strategy stops accepting ticks.
    pub async fn run(self) {
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    tracing::info!("Connected to {}", self.url);
                    let (mut write, mut read) = ws_stream.split();

                    while let Some(message) = read.next().await {
                        match message {
                            Ok(Message::Text(txt)) => match parse_agg_trade(&txt) {
                                Some(tick) => {
                                    if self.handle.on_tick(tick).is_err() {
                                        tracing::info!("Strategy stopped, closing trade stream");
                                        return;
                                    }
                                }
                                None => tracing::debug!("Ignoring message: {}", txt.as_str()),
                            },
                            Ok(Message::Ping(payload)) => {
                                if let Err(e) = write.send(Message::Pong(payload)).await {
                                    tracing::warn!("Failed to answer ping: {}", e);
                                    break;
                                }
                            }
                            Ok(Message::Close(frame)) => {
                                tracing::warn!("Trade stream closed by server: {:?}", frame);
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!("Trade stream error: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to connect to {}: {}", self.url, e);
                }
            }

            tracing::info!("Reconnecting in {:?}", RECONNECT_DELAY);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agg_trade() {
        let payload = r#"{"e":"aggTrade","E":1672515782136,"s":"ETHUSDT","a":12345,"p":"1620.55","q":"0.0410","f":100,"l":105,"T":1672515782134,"m":true,"M":true}"#;
        let tick = parse_agg_trade(payload).unwrap();
        assert_eq!(tick.price, 1620.55);
        assert_eq!(tick.size, 0.041);
        assert_eq!(tick.timestamp, 1672515782134);
    }

    #[test]
    fn test_parse_rejects_other_messages() {
        assert!(parse_agg_trade(r#"{"result":null,"id":1}"#).is_none());
        assert!(parse_agg_trade(r#"{"p":"abc","q":"1","T":1}"#).is_none());
        assert!(parse_agg_trade("not json").is_none());
    }

    #[test]
    fn test_stream_url() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let stream = TradeStream::new("wss://stream.binance.com:9443/ws/", "ETHUSDT", StrategyHandle::from_sender(tx));
        assert_eq!(stream.url(), "wss://stream.binance.com:9443/ws/ethusdt@aggTrade");
    }
}
