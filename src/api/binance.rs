use super::ExchangeGateway;
use crate::error::GatewayError;
use crate::models::{Candle, OrderAck, OrderRequest, OrderState, OrderStatus, Timeframe};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;

// Binance Spot REST API
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
const LIVE_REST_URL: &str = "https://api.binance.com";
const TESTNET_REST_URL: &str = "https://testnet.binance.vision";
const LIVE_WS_URL: &str = "wss://stream.binance.com:9443/ws";
const TESTNET_WS_URL: &str = "wss://testnet.binance.vision/ws";

const RECV_WINDOW_MS: u64 = 5000;
const REQUESTS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(600) {
    Some(n) => n,
    None => unreachable!(),
};

type HmacSha256 = Hmac<Sha256>;
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Signed Binance Spot REST client
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    ws_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    status: String,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
}

impl BinanceClient {
    pub fn new(testnet: bool, api_key: Option<String>, api_secret: Option<String>) -> Self {
        let (rest, ws) = if testnet {
            (TESTNET_REST_URL, TESTNET_WS_URL)
        } else {
            (LIVE_REST_URL, LIVE_WS_URL)
        };
        Self::with_base_url(rest, ws, api_key, api_secret)
    }

    /// Client against custom endpoints (used for tests against a mock server)
    pub fn with_base_url(
        base_url: impl Into<String>,
        ws_url: impl Into<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
            ws_url: ws_url.into(),
            api_key,
            api_secret,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(REQUESTS_PER_MINUTE))),
        }
    }

    /// WebSocket endpoint for market streams
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Append timestamp + signature to the query
    fn sign_params(&self, mut params: Vec<(String, String)>) -> Result<String, GatewayError> {
        let secret = self
            .api_secret
            .as_ref()
            .ok_or(GatewayError::MissingCredentials)?;

        params.push((
            "timestamp".into(),
            chrono::Utc::now().timestamp_millis().to_string(),
        ));
        params.push(("recvWindow".into(), RECV_WINDOW_MS.to_string()));

        let query = serde_urlencoded::to_string(&params)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| GatewayError::Decode(format!("invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query, signature))
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(String, String)>,
        signed: bool,
    ) -> Result<Value, GatewayError> {
        let query = if signed {
            self.sign_params(params)?
        } else {
            serde_urlencoded::to_string(&params)?
        };
        let url = format!("{}{}?{}", self.base_url, endpoint, query);

        self.rate_limiter.until_ready().await;

        let mut builder = self.client.request(method.clone(), &url);
        if let Some(key) = &self.api_key {
            builder = builder.header("X-MBX-APIKEY", key);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!("Connection error while making {} request to {}: {}", method, endpoint, e);
            GatewayError::Http(e)
        })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(
                "Error while making {} request to {}: {} (error code {})",
                method,
                endpoint,
                body,
                status
            );
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Map a Binance order status string
/// Quantity truncated to 4 decimals so it never exceeds the sized amount
pub fn format_quantity(quantity: f64) -> String {
    let truncated = (quantity * 1e4 + 1e-9).floor() / 1e4;
    format!("{:.4}", truncated)
}

pub fn parse_order_status(status: &str) -> Result<OrderStatus, GatewayError> {
    match status {
        "NEW" => Ok(OrderStatus::New),
        "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" => Ok(OrderStatus::Canceled),
        "PENDING_CANCEL" => Ok(OrderStatus::PendingCancel),
        "REJECTED" => Ok(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => Err(GatewayError::UnknownOrderStatus(other.to_string())),
    }
}

/// Volume-weighted fill price from executed base and quote quantities
fn average_fill_price(executed_qty: Option<&str>, quote_qty: Option<&str>) -> Option<f64> {
    let executed: f64 = executed_qty?.parse().ok()?;
    let quote: f64 = quote_qty?.parse().ok()?;
    if executed > 0.0 {
        Some(quote / executed)
    } else {
        None
    }
}

fn parse_order(value: Value) -> Result<(u64, OrderStatus, Option<f64>), GatewayError> {
    let raw: OrderResponse = serde_json::from_value(value)?;
    let status = parse_order_status(&raw.status)?;
    let avg_price = average_fill_price(
        raw.executed_qty.as_deref(),
        raw.cummulative_quote_qty.as_deref(),
    );
    Ok((raw.order_id, status, avg_price))
}

fn parse_kline(row: &Value) -> Option<Candle> {
    let arr = row.as_array()?;
    if arr.len() < 7 {
        return None;
    }
    Some(Candle {
        open_time: arr[0].as_i64()?,
        open: arr[1].as_str()?.parse().ok()?,
        high: arr[2].as_str()?.parse().ok()?,
        low: arr[3].as_str()?.parse().ok()?,
        close: arr[4].as_str()?.parse().ok()?,
        volume: arr[5].as_str()?.parse().ok()?,
        close_time: arr[6].as_i64()?,
    })
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn account_balance(&self, asset: &str) -> Result<f64, GatewayError> {
        let value = self
            .request(Method::GET, "/api/v3/account", Vec::new(), true)
            .await?;
        let account: AccountResponse = serde_json::from_value(value)?;

        let entry = account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .ok_or_else(|| GatewayError::UnknownAsset(asset.to_string()))?;

        entry
            .free
            .parse()
            .map_err(|_| GatewayError::Decode(format!("bad balance {:?}", entry.free)))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let mut params = vec![
            ("symbol".to_string(), order.symbol.clone()),
            ("side".to_string(), order.side.as_str().to_string()),
            ("type".to_string(), order.order_type.as_str().to_string()),
            ("quantity".to_string(), format_quantity(order.quantity)),
        ];
        if let Some(price) = order.price {
            params.push(("price".to_string(), format!("{:.8}", price)));
        }
        if let Some(tif) = order.time_in_force {
            params.push(("timeInForce".to_string(), tif.as_str().to_string()));
        }

        let value = self
            .request(Method::POST, "/api/v3/order", params, true)
            .await?;
        let (order_id, status, avg_price) = parse_order(value)?;

        tracing::info!(order_id, ?status, ?avg_price, "Order placed on Binance");

        Ok(OrderAck {
            order_id,
            status,
            avg_price: if status.is_filled() { avg_price } else { None },
        })
    }

    async fn order_status(&self, symbol: &str, order_id: u64) -> Result<OrderState, GatewayError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let value = self
            .request(Method::GET, "/api/v3/order", params, true)
            .await?;
        let (_, status, avg_price) = parse_order(value)?;

        Ok(OrderState { status, avg_price })
    }

    async fn cancel_orders(&self, symbol: &str) -> Result<(), GatewayError> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        self.request(Method::DELETE, "/api/v3/openOrders", params, true)
            .await?;
        Ok(())
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("interval".to_string(), timeframe.as_str().to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let value = self
            .request(Method::GET, "/api/v3/klines", params, false)
            .await?;

        let rows = value
            .as_array()
            .ok_or_else(|| GatewayError::Decode("klines response is not an array".into()))?;
        let candles: Vec<Candle> = rows.iter().filter_map(parse_kline).collect();

        tracing::info!(
            "Loaded {} historical {} candles for {}",
            candles.len(),
            timeframe,
            symbol
        );
        Ok(candles)
    }
}
