use super::ExchangeGateway;
use crate::error::GatewayError;
use crate::models::{Candle, OrderAck, OrderRequest, OrderState, OrderStatus, Timeframe};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<String, f64>,
    orders: HashMap<u64, OrderState>,
    placed: Vec<OrderRequest>,
    history: Vec<Candle>,
    next_order_id: u64,
    status_calls: u32,
    cancel_calls: u32,
    // market orders fill immediately at this price when set
    instant_fill_price: Option<f64>,
    fail_placements: u32,
    fail_status_polls: u32,
    // accepted placements answer with these statuses first
    queued_ack_statuses: VecDeque<OrderStatus>,
}

/// In-memory exchange for dry runs and tests
///
/// Orders rest as `NEW` until [`InMemoryGateway::fill_order`] is called,
/// unless an instant fill price is configured. Cloning shares state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    book: Arc<Mutex<Book>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_balance(self, asset: &str, amount: f64) -> Self {
        self.book().balances.insert(asset.to_string(), amount);
        self
    }

    pub fn with_history(self, candles: Vec<Candle>) -> Self {
        self.book().history = candles;
        self
    }

    /// Fill market orders synchronously at `price`
    pub fn set_instant_fill(&self, price: Option<f64>) {
        self.book().instant_fill_price = price;
    }

    /// Fail the next `n` order placements with an API error
    pub fn fail_next_placements(&self, n: u32) {
        self.book().fail_placements = n;
    }

    /// Fail the next `n` status polls with an API error
    pub fn fail_next_status_polls(&self, n: u32) {
        self.book().fail_status_polls = n;
    }

    /// Answer the next accepted placement with `status` instead of filling or resting
    pub fn queue_ack_status(&self, status: OrderStatus) {
        self.book().queued_ack_statuses.push_back(status);
    }

    /// Mark a resting order as filled
    pub fn fill_order(&self, order_id: u64, avg_price: f64) {
        self.book().orders.insert(
            order_id,
            OrderState {
                status: OrderStatus::Filled,
                avg_price: Some(avg_price),
            },
        );
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.book().placed.clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.book().status_calls
    }

    pub fn cancel_calls(&self) -> u32 {
        self.book().cancel_calls
    }
}

#[async_trait]
impl ExchangeGateway for InMemoryGateway {
    async fn account_balance(&self, asset: &str) -> Result<f64, GatewayError> {
        self.book()
            .balances
            .get(asset)
            .copied()
            .ok_or_else(|| GatewayError::UnknownAsset(asset.to_string()))
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let mut book = self.book();
        if book.fail_placements > 0 {
            book.fail_placements -= 1;
            return Err(GatewayError::Api {
                status: 503,
                body: "placement rejected".into(),
            });
        }

        book.next_order_id += 1;
        let order_id = book.next_order_id;
        book.placed.push(order.clone());

        let state = match (book.queued_ack_statuses.pop_front(), book.instant_fill_price) {
            (Some(status), _) => OrderState {
                status,
                avg_price: None,
            },
            (None, Some(price)) => OrderState {
                status: OrderStatus::Filled,
                avg_price: Some(price),
            },
            (None, None) => OrderState {
                status: OrderStatus::New,
                avg_price: None,
            },
        };
        book.orders.insert(order_id, state.clone());

        Ok(OrderAck {
            order_id,
            status: state.status,
            avg_price: state.avg_price,
        })
    }

    async fn order_status(&self, _symbol: &str, order_id: u64) -> Result<OrderState, GatewayError> {
        let mut book = self.book();
        book.status_calls += 1;
        if book.fail_status_polls > 0 {
            book.fail_status_polls -= 1;
            return Err(GatewayError::Api {
                status: 500,
                body: "status unavailable".into(),
            });
        }

        book.orders.get(&order_id).cloned().ok_or(GatewayError::Api {
            status: 400,
            body: format!("order {} does not exist", order_id),
        })
    }

    async fn cancel_orders(&self, _symbol: &str) -> Result<(), GatewayError> {
        let mut book = self.book();
        book.cancel_calls += 1;
        for state in book.orders.values_mut() {
            if !state.status.is_filled() {
                state.status = OrderStatus::Canceled;
            }
        }
        Ok(())
    }

    async fn historical_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let book = self.book();
        let skip = book.history.len().saturating_sub(limit as usize);
        Ok(book.history[skip..].to_vec())
    }
}
