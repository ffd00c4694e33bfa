use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::ExchangeGateway;
use crate::models::{OrderRequest, OrderStatus, Side, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    PendingOpen,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    FillTimedOut, // entry never confirmed; order cancelled
}

#[derive(Debug, Clone)]
pub struct Trade {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: Option<f64>, // None until the fill is confirmed
    pub order_id: u64,            // entry order
    pub status: TradeStatus,
    pub pnl: f64,
    pub exit_price: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl Trade {
    fn close(&mut self, exit_price: Option<f64>, reason: ExitReason) {
        if let (Some(entry), Some(exit)) = (self.entry_price, exit_price) {
            self.pnl = match self.side {
                Side::Long => (exit - entry) * self.quantity,
                Side::Short => (entry - exit) * self.quantity,
            };
        }
        self.status = TradeStatus::Closed;
        self.exit_price = exit_price;
        self.closed_at = Some(Utc::now());
        self.exit_reason = Some(reason);
    }
}

/// Sizing and exit thresholds for one instrument
#[derive(Debug, Clone)]
pub struct PositionSettings {
    pub symbol: String,
    pub base_asset: String,
    pub balance_pct: f64,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
}

/// Result of an entry attempt
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    /// Entry filled synchronously; the trade is open
    Filled { trade_id: Uuid, entry_price: f64 },
    /// Entry accepted but unfilled; the caller must track `order_id`
    Pending { trade_id: Uuid, order_id: u64 },
    Skipped(&'static str),
}

/// Owns the trade set for one instrument
///
/// Trades move `PendingOpen -> Open -> Closed` (or `PendingOpen -> Closed`
/// when the entry times out); `Closed` is terminal and `entry_price` is set once.
pub struct PositionManager {
    trades: Vec<Trade>,
    settings: PositionSettings,
    gateway: Arc<dyn ExchangeGateway>,
}

impl PositionManager {
    pub fn new(settings: PositionSettings, gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            trades: Vec::new(),
            settings,
            gateway,
        }
    }

    /// Get all trades in insertion order
    pub fn all_trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn settings(&self) -> &PositionSettings {
        &self.settings
    }

    /// True while any trade is pending or open
    pub fn ongoing_position(&self) -> bool {
        self.trades
            .iter()
            .any(|t| t.status != TradeStatus::Closed)
    }

    /// Get all open trades
    pub fn open_trades(&self) -> Vec<&Trade> {
        self.trades
            .iter()
            .filter(|t| t.status == TradeStatus::Open)
            .collect()
    }

    /// Get total realized P&L
    pub fn total_pnl(&self) -> f64 {
        self.trades
            .iter()
            .filter(|t| t.status == TradeStatus::Closed)
            .map(|t| t.pnl)
            .sum()
    }

    fn get_trade_by_order_mut(&mut self, order_id: u64) -> anyhow::Result<&mut Trade> {
        self.trades
            .iter_mut()
            .find(|t| t.order_id == order_id)
            .ok_or_else(|| anyhow::anyhow!("No trade for order {}", order_id))
    }

    /// Trade size from the configured share of the base asset balance
    pub async fn trade_size(&self) -> anyhow::Result<f64> {
        let balance = self
            .gateway
            .account_balance(&self.settings.base_asset)
            .await?;
        let size = balance * self.settings.balance_pct / 100.0;

        tracing::info!(
            "Current {} balance = {}, trade size = {}",
            self.settings.base_asset,
            balance,
            size
        );
        Ok(size)
    }

    /// Submit a market entry for `signal`
    ///
    /// Placement failures are returned to the caller and not retried.
    pub async fn open_position(&mut self, signal: Signal) -> anyhow::Result<OpenOutcome> {
        let side = match signal {
            Signal::Long => Side::Long,
            Signal::Short => Side::Short,
            Signal::None => return Ok(OpenOutcome::Skipped("no signal")),
        };

        if self.ongoing_position() {
            return Ok(OpenOutcome::Skipped("position already ongoing"));
        }

        let quantity = self.trade_size().await?;
        if quantity <= 0.0 {
            return Ok(OpenOutcome::Skipped("trade size is zero"));
        }

        tracing::info!("{:?} signal on {}", side, self.settings.symbol);

        let order_side = side.entry_order_side();
        let ack = self
            .gateway
            .place_order(&OrderRequest::market(
                self.settings.symbol.clone(),
                order_side,
                quantity,
            ))
            .await?;

        tracing::info!(
            "{:?} order placed | Status: {:?}",
            order_side,
            ack.status
        );

        if ack.status.is_terminal_failure() {
            anyhow::bail!("Entry order {} ended as {:?}", ack.order_id, ack.status);
        }

        let entry_price = match (ack.status, ack.avg_price) {
            (OrderStatus::Filled, Some(price)) => Some(price),
            _ => None,
        };

        let id = Uuid::new_v4();
        self.trades.push(Trade {
            id,
            opened_at: Utc::now(),
            side,
            quantity,
            entry_price,
            order_id: ack.order_id,
            status: if entry_price.is_some() {
                TradeStatus::Open
            } else {
                TradeStatus::PendingOpen
            },
            pnl: 0.0,
            exit_price: None,
            closed_at: None,
            exit_reason: None,
        });

        Ok(match entry_price {
            Some(entry_price) => OpenOutcome::Filled {
                trade_id: id,
                entry_price,
            },
            None => OpenOutcome::Pending {
                trade_id: id,
                order_id: ack.order_id,
            },
        })
    }

    /// Back-fill the entry price of a pending trade
    ///
    /// Returns `false` when the trade already left `PendingOpen`.
    pub fn record_fill(&mut self, order_id: u64, avg_price: f64) -> anyhow::Result<bool> {
        let trade = self.get_trade_by_order_mut(order_id)?;

        if trade.status != TradeStatus::PendingOpen || trade.entry_price.is_some() {
            tracing::debug!(
                order_id,
                status = ?trade.status,
                "Ignoring fill for trade that is no longer pending"
            );
            return Ok(false);
        }

        trade.entry_price = Some(avg_price);
        trade.status = TradeStatus::Open;
        tracing::info!(order_id, price = avg_price, "Entry fill confirmed");
        Ok(true)
    }

    /// Give up on a pending entry whose fill never arrived
    pub fn expire_pending(&mut self, order_id: u64) -> anyhow::Result<bool> {
        let trade = self.get_trade_by_order_mut(order_id)?;
        if trade.status != TradeStatus::PendingOpen {
            return Ok(false);
        }

        trade.close(None, ExitReason::FillTimedOut);
        tracing::warn!(order_id, "Entry fill timed out, trade abandoned");
        Ok(true)
    }

    /// Stop-loss / take-profit check for a trade entered at `entry`
    pub fn exit_trigger(&self, side: Side, entry: f64, price: f64) -> Option<ExitReason> {
        let (stop_hit, profit_hit) = match side {
            Side::Long => (
                self.settings
                    .stop_loss_pct
                    .is_some_and(|sl| price <= entry * (1.0 - sl / 100.0)),
                self.settings
                    .take_profit_pct
                    .is_some_and(|tp| price >= entry * (1.0 + tp / 100.0)),
            ),
            Side::Short => (
                self.settings
                    .stop_loss_pct
                    .is_some_and(|sl| price >= entry * (1.0 + sl / 100.0)),
                self.settings
                    .take_profit_pct
                    .is_some_and(|tp| price <= entry * (1.0 - tp / 100.0)),
            ),
        };

        if stop_hit {
            Some(ExitReason::StopLoss)
        } else if profit_hit {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }

    /// Check every open trade against `last_close` and exit the triggered ones
    ///
    /// A failed exit order leaves the trade open so the next tick retries it.
    pub async fn check_exits(&mut self, last_close: f64) -> anyhow::Result<Vec<Uuid>> {
        let to_close: Vec<(Uuid, Side, f64, ExitReason)> = self
            .trades
            .iter()
            .filter_map(|t| match (t.status, t.entry_price) {
                (TradeStatus::Open, Some(entry)) => self
                    .exit_trigger(t.side, entry, last_close)
                    .map(|reason| (t.id, t.side, t.quantity, reason)),
                _ => None,
            })
            .collect();

        let mut closed_ids = Vec::new();
        for (trade_id, side, quantity, reason) in to_close {
            tracing::info!("{:?} for {} at {}", reason, self.settings.symbol, last_close);

            let order =
                OrderRequest::market(self.settings.symbol.clone(), side.exit_order_side(), quantity);
            match self.gateway.place_order(&order).await {
                Ok(ack) if ack.status.is_terminal_failure() => {
                    tracing::error!(
                        order_id = ack.order_id,
                        "Exit order for trade {} ended as {:?}, trade stays open",
                        trade_id,
                        ack.status
                    );
                }
                Ok(ack) => {
                    tracing::info!(
                        "Exit order on {} placed successfully | Status: {:?}",
                        self.settings.symbol,
                        ack.status
                    );
                    let exit_price = ack.avg_price.unwrap_or(last_close);
                    if let Some(trade) = self.trades.iter_mut().find(|t| t.id == trade_id) {
                        trade.close(Some(exit_price), reason);
                    }
                    closed_ids.push(trade_id);
                }
                Err(e) => {
                    tracing::error!("Exit order for trade {} failed: {}", trade_id, e);
                }
            }
        }

        Ok(closed_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryGateway;
    use crate::models::OrderSide;

    fn settings() -> PositionSettings {
        PositionSettings {
            symbol: "ETHUSDT".to_string(),
            base_asset: "ETH".to_string(),
            balance_pct: 25.0,
            take_profit_pct: Some(0.5),
            stop_loss_pct: Some(0.5),
        }
    }

    fn manager(gateway: &InMemoryGateway) -> PositionManager {
        PositionManager::new(settings(), Arc::new(gateway.clone()))
    }

    #[tokio::test]
    async fn test_open_position_pending() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);

        let outcome = pm.open_position(Signal::Long).await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Pending { order_id: 1, .. }));
        assert!(pm.ongoing_position());

        let trade = &pm.all_trades()[0];
        assert_eq!(trade.status, TradeStatus::PendingOpen);
        assert_eq!(trade.entry_price, None);
        assert_eq!(trade.quantity, 1.0); // 25% of 4 ETH

        let placed = gateway.placed_orders();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn test_open_position_instant_fill() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        gateway.set_instant_fill(Some(2000.0));
        let mut pm = manager(&gateway);

        let outcome = pm.open_position(Signal::Short).await.unwrap();
        assert!(matches!(outcome, OpenOutcome::Filled { entry_price, .. } if entry_price == 2000.0));

        let trade = &pm.all_trades()[0];
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.side, Side::Short);
        assert_eq!(gateway.placed_orders()[0].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn test_prevent_second_position() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);

        pm.open_position(Signal::Long).await.unwrap();
        let outcome = pm.open_position(Signal::Short).await.unwrap();
        assert_eq!(outcome, OpenOutcome::Skipped("position already ongoing"));
        assert_eq!(gateway.placed_orders().len(), 1);
        assert_eq!(pm.all_trades().len(), 1);
    }

    #[tokio::test]
    async fn test_placement_failure_creates_no_trade() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        gateway.fail_next_placements(1);
        let mut pm = manager(&gateway);

        assert!(pm.open_position(Signal::Long).await.is_err());
        assert!(pm.all_trades().is_empty());
        assert!(!pm.ongoing_position());
    }

    #[tokio::test]
    async fn test_none_signal_skips() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);
        let outcome = pm.open_position(Signal::None).await.unwrap();
        assert_eq!(outcome, OpenOutcome::Skipped("no signal"));
        assert!(gateway.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_record_fill_sets_entry_once() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);
        pm.open_position(Signal::Long).await.unwrap();

        assert!(pm.record_fill(1, 100.0).unwrap());
        assert!(!pm.record_fill(1, 105.0).unwrap());

        let trade = &pm.all_trades()[0];
        assert_eq!(trade.entry_price, Some(100.0));
        assert_eq!(trade.status, TradeStatus::Open);
    }

    #[tokio::test]
    async fn test_record_fill_unknown_order() {
        let gateway = InMemoryGateway::new();
        let mut pm = manager(&gateway);
        let result = pm.record_fill(99, 1.0);
        assert!(result.unwrap_err().to_string().contains("No trade"));
    }

    #[test]
    fn test_exit_trigger_long() {
        let pm = manager(&InMemoryGateway::new());
        assert_eq!(pm.exit_trigger(Side::Long, 100.0, 99.4), Some(ExitReason::StopLoss));
        assert_eq!(pm.exit_trigger(Side::Long, 100.0, 100.6), Some(ExitReason::TakeProfit));
        assert_eq!(pm.exit_trigger(Side::Long, 100.0, 100.2), None);
    }

    #[test]
    fn test_exit_trigger_short_inverted() {
        let pm = manager(&InMemoryGateway::new());
        assert_eq!(pm.exit_trigger(Side::Short, 100.0, 100.6), Some(ExitReason::StopLoss));
        assert_eq!(pm.exit_trigger(Side::Short, 100.0, 99.4), Some(ExitReason::TakeProfit));
        assert_eq!(pm.exit_trigger(Side::Short, 100.0, 99.8), None);
    }

    #[test]
    fn test_exit_trigger_disabled_thresholds() {
        let pm = PositionManager::new(
            PositionSettings {
                take_profit_pct: None,
                stop_loss_pct: None,
                ..settings()
            },
            Arc::new(InMemoryGateway::new()),
        );
        assert_eq!(pm.exit_trigger(Side::Long, 100.0, 50.0), None);
        assert_eq!(pm.exit_trigger(Side::Long, 100.0, 150.0), None);
    }

    #[tokio::test]
    async fn test_check_exits_closes_trade() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);
        pm.open_position(Signal::Long).await.unwrap();
        pm.record_fill(1, 100.0).unwrap();

        assert!(pm.check_exits(100.2).await.unwrap().is_empty());

        let closed = pm.check_exits(101.0).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert!(!pm.ongoing_position());

        let trade = &pm.all_trades()[0];
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(trade.exit_price, Some(101.0));
        assert!((trade.pnl - 1.0).abs() < 1e-9); // (101 - 100) * 1.0

        let exit = &gateway.placed_orders()[1];
        assert_eq!(exit.side, OrderSide::Sell);
        assert_eq!(exit.quantity, 1.0);
    }

    #[tokio::test]
    async fn test_check_exits_skips_pending_trades() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);
        pm.open_position(Signal::Long).await.unwrap();

        // no entry price yet, nothing to evaluate
        assert!(pm.check_exits(1.0).await.unwrap().is_empty());
        assert_eq!(gateway.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_exit_keeps_trade_open() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);
        pm.open_position(Signal::Long).await.unwrap();
        pm.record_fill(1, 100.0).unwrap();

        gateway.fail_next_placements(1);
        assert!(pm.check_exits(90.0).await.unwrap().is_empty());
        assert_eq!(pm.all_trades()[0].status, TradeStatus::Open);

        let closed = pm.check_exits(90.0).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(pm.all_trades()[0].exit_reason, Some(ExitReason::StopLoss));
    }

    #[tokio::test]
    async fn test_expired_exit_keeps_trade_open() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);
        pm.open_position(Signal::Long).await.unwrap();
        pm.record_fill(1, 100.0).unwrap();

        gateway.queue_ack_status(OrderStatus::Expired);
        assert!(pm.check_exits(90.0).await.unwrap().is_empty());

        let trade = &pm.all_trades()[0];
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.pnl, 0.0);
        assert_eq!(trade.exit_reason, None);
        assert!(pm.ongoing_position());

        // next check retries and the exchange accepts
        let closed = pm.check_exits(90.0).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(gateway.placed_orders().len(), 3);
        assert!((pm.all_trades()[0].pnl + 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejected_entry_creates_no_trade() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        gateway.queue_ack_status(OrderStatus::Rejected);
        let mut pm = manager(&gateway);

        assert!(pm.open_position(Signal::Long).await.is_err());
        assert!(!pm.ongoing_position());
    }

    #[tokio::test]
    async fn test_closed_is_terminal() {
        let gateway = InMemoryGateway::new().with_balance("ETH", 4.0);
        let mut pm = manager(&gateway);
        pm.open_position(Signal::Long).await.unwrap();

        assert!(pm.expire_pending(1).unwrap());
        assert!(!pm.ongoing_position());

        // late fill after time-out does not reopen
        assert!(!pm.record_fill(1, 100.0).unwrap());
        let trade = &pm.all_trades()[0];
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.entry_price, None);
        assert_eq!(trade.exit_reason, Some(ExitReason::FillTimedOut));
        assert_eq!(pm.total_pnl(), 0.0);
    }
}
