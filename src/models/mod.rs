use serde::{Deserialize, Serialize};

/// One executed trade from the exchange stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub size: f64,
    pub timestamp: i64, // ms since epoch
}

impl Tick {
    pub fn new(price: f64, size: f64, timestamp: i64) -> Self {
        Self {
            price,
            size,
            timestamp,
        }
    }
}

/// OHLCV candlestick for one fixed interval
///
/// Times are milliseconds since epoch; `close_time` is inclusive, so a 1m
/// candle opening at 0 closes at 59_999.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Candle seeded from a single price
    pub fn seeded(open_time: i64, close_time: i64, price: f64, volume: f64) -> Self {
        Self {
            open_time,
            close_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }
}

/// Candle timeframe supported by the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    /// Bucket width in milliseconds
    ///
    /// 30m shares the 15m width; the live strategy has always run with it.
    pub fn interval_ms(&self) -> i64 {
        let secs = match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 900,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14400,
        };
        secs * 1000
    }

    /// Exchange kline interval string
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional decision produced by the signal evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    None,
}

/// Direction of an open trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens a trade in this direction
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens a trade in this direction
    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "FOK")]
    FillOrKill,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GoodTilCancelled => "GTC",
            TimeInForce::ImmediateOrCancel => "IOC",
            TimeInForce::FillOrKill => "FOK",
        }
    }
}

/// Exchange-side order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }

    /// Order is finished and nothing executed
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected | OrderStatus::Expired | OrderStatus::Canceled
        )
    }
}

/// Entry or exit order submitted to the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,
    pub time_in_force: Option<TimeInForce>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            order_type: OrderType::Market,
            side,
            quantity,
            price: None,
            time_in_force: None,
        }
    }
}

/// Response to an order placement
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub status: OrderStatus,
    pub avg_price: Option<f64>,
}

/// Response to an order status lookup
#[derive(Debug, Clone, PartialEq)]
pub struct OrderState {
    pub status: OrderStatus,
    pub avg_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_intervals() {
        assert_eq!(Timeframe::M1.interval_ms(), 60_000);
        assert_eq!(Timeframe::H4.interval_ms(), 14_400_000);
        // 30m keeps the 15m bucket width
        assert_eq!(Timeframe::M30.interval_ms(), Timeframe::M15.interval_ms());
    }

    #[test]
    fn test_timeframe_deserialize() {
        let tf: Timeframe = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(tf, Timeframe::M15);
        assert_eq!(tf.to_string(), "15m");
    }

    #[test]
    fn test_side_order_mapping() {
        assert_eq!(Side::Long.entry_order_side(), OrderSide::Buy);
        assert_eq!(Side::Long.exit_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.entry_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.exit_order_side(), OrderSide::Buy);
    }

    #[test]
    fn test_terminal_failure_statuses() {
        assert!(OrderStatus::Expired.is_terminal_failure());
        assert!(OrderStatus::Rejected.is_terminal_failure());
        assert!(OrderStatus::Canceled.is_terminal_failure());
        assert!(!OrderStatus::New.is_terminal_failure());
        assert!(!OrderStatus::Filled.is_terminal_failure());
        assert!(!OrderStatus::PartiallyFilled.is_terminal_failure());
    }

    #[test]
    fn test_order_status_wire_format() {
        let status: OrderStatus = serde_json::from_str("\"PARTIALLY_FILLED\"").unwrap();
        assert_eq!(status, OrderStatus::PartiallyFilled);
        assert!(!status.is_filled());

        let status: OrderStatus = serde_json::from_str("\"FILLED\"").unwrap();
        assert!(status.is_filled());
    }
}
