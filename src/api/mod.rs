pub mod binance;
pub mod memory;

pub use binance::BinanceClient;
pub use memory::InMemoryGateway;

use crate::error::GatewayError;
use crate::models::{Candle, OrderAck, OrderRequest, OrderState, Timeframe};
use async_trait::async_trait;

/// Exchange operations the strategy depends on
///
/// Implementations own transport, signing and rate limiting. Every call may
/// fail with a [`GatewayError`]; callers treat that as "skip this cycle".
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Free balance of `asset`
    async fn account_balance(&self, asset: &str) -> Result<f64, GatewayError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError>;

    async fn order_status(&self, symbol: &str, order_id: u64) -> Result<OrderState, GatewayError>;

    /// Cancel every open order on `symbol`
    async fn cancel_orders(&self, symbol: &str) -> Result<(), GatewayError>;

    /// Most recent candles, oldest first; the last one is usually still forming
    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError>;
}
