use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::api::ExchangeGateway;
use crate::config::BotConfig;
use crate::execution::{
    BucketEvent, CandleAggregator, FillOutcome, OpenOutcome, OrderFillTracker, PositionManager,
    Trade,
};
use crate::models::{Candle, Signal, Tick};
use crate::strategy::{Strategy, TechnicalStrategy};

/// Inputs to the strategy's single owner
#[derive(Debug)]
pub enum StrategyEvent {
    Tick(Tick),
    OrderFilled { order_id: u64, avg_price: f64 },
    FillTimedOut { order_id: u64, attempts: u32 },
    Snapshot(oneshot::Sender<StrategySnapshot>),
}

/// Activity journal entry
#[derive(Debug, Clone)]
pub struct StrategyLog {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Read-only copy of the strategy state
#[derive(Debug, Clone)]
pub struct StrategySnapshot {
    pub candles: Vec<Candle>,
    pub trades: Vec<Trade>,
    pub ongoing_position: bool,
    pub total_pnl: f64,
    pub journal: Vec<StrategyLog>,
}

/// Cloneable entry point to a running orchestrator
#[derive(Clone)]
pub struct StrategyHandle {
    tx: mpsc::UnboundedSender<StrategyEvent>,
}

impl StrategyHandle {
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<StrategyEvent>) -> Self {
        Self { tx }
    }

    /// Feed one trade event
    pub fn on_tick(&self, tick: Tick) -> anyhow::Result<()> {
        self.tx
            .send(StrategyEvent::Tick(tick))
            .map_err(|_| anyhow::anyhow!("Strategy loop has stopped"))
    }

    pub async fn snapshot(&self) -> anyhow::Result<StrategySnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(StrategyEvent::Snapshot(reply))
            .map_err(|_| anyhow::anyhow!("Strategy loop has stopped"))?;
        Ok(rx.await?)
    }
}

/// Single owner of candles and trades for one instrument
///
/// Ticks, fill confirmations and snapshot requests are queued and handled
/// one at a time, so no two state mutations interleave.
pub struct StrategyOrchestrator<S: Strategy> {
    symbol: String,
    strategy: S,
    aggregator: CandleAggregator,
    positions: PositionManager,
    tracker: OrderFillTracker,
    gateway: Arc<dyn ExchangeGateway>,
    journal: VecDeque<StrategyLog>,
    journal_len: usize,
    rx: mpsc::UnboundedReceiver<StrategyEvent>,
    fill_tx: mpsc::WeakUnboundedSender<StrategyEvent>,
    // aborted on drop so no tracker outlives the loop
    trackers: Vec<JoinHandle<()>>,
}

impl StrategyOrchestrator<TechnicalStrategy> {
    /// Wire the RSI+MACD strategy from configuration, seeded with `history`
    pub fn from_config(
        config: &BotConfig,
        gateway: Arc<dyn ExchangeGateway>,
        history: Vec<Candle>,
    ) -> (Self, StrategyHandle) {
        let strategy = TechnicalStrategy::new(config.indicator_config(), config.signal_config());
        let aggregator =
            CandleAggregator::with_history(config.interval_ms(), config.max_candles, history);
        let positions = PositionManager::new(config.position_settings(), gateway.clone());
        let tracker =
            OrderFillTracker::new(gateway.clone(), config.symbol.clone(), config.fill_policy());

        Self::new(strategy, aggregator, positions, tracker, gateway, config.journal_len)
    }
}

impl<S: Strategy> StrategyOrchestrator<S> {
    pub fn new(
        strategy: S,
        aggregator: CandleAggregator,
        positions: PositionManager,
        tracker: OrderFillTracker,
        gateway: Arc<dyn ExchangeGateway>,
        journal_len: usize,
    ) -> (Self, StrategyHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            symbol: positions.settings().symbol.clone(),
            strategy,
            aggregator,
            positions,
            tracker,
            gateway,
            journal: VecDeque::new(),
            journal_len,
            rx,
            fill_tx: tx.downgrade(),
            trackers: Vec::new(),
        };
        (orchestrator, StrategyHandle::from_sender(tx))
    }

    /// Process events until every handle is dropped
    pub async fn run(mut self) {
        tracing::info!(
            "Strategy {} running on {} ({} candles of history)",
            self.strategy.name(),
            self.symbol,
            self.aggregator.len()
        );

        while let Some(event) = self.rx.recv().await {
            self.handle_event(event).await;
        }

        tracing::info!("Strategy loop for {} stopped", self.symbol);
    }

    pub async fn handle_event(&mut self, event: StrategyEvent) {
        match event {
            StrategyEvent::Tick(tick) => {
                self.on_tick(tick).await;
            }
            StrategyEvent::OrderFilled {
                order_id,
                avg_price,
            } => self.on_fill(order_id, avg_price),
            StrategyEvent::FillTimedOut { order_id, attempts } => {
                self.on_fill_timeout(order_id, attempts).await
            }
            StrategyEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Fold a tick, re-check exits, and evaluate signals on bucket boundaries
    pub async fn on_tick(&mut self, tick: Tick) -> BucketEvent {
        let event = self.aggregator.ingest(tick);

        if let BucketEvent::GapFilledThenNew { missing } = event {
            self.log(format!("Filled {} missing candles for {}", missing, self.symbol));
        }

        if let Some(last_close) = self.aggregator.last_close() {
            match self.positions.check_exits(last_close).await {
                Ok(closed) => {
                    for trade_id in closed {
                        self.log(format!(
                            "Exit order on {} placed successfully, trade {} closed",
                            self.symbol, trade_id
                        ));
                    }
                }
                Err(e) => tracing::error!("Failed to check exits: {}", e),
            }
        }

        if event.is_new_bucket() {
            self.check_signal_and_trade().await;
        }

        event
    }

    /// Evaluate the strategy and open a position on a directional signal
    pub async fn check_signal_and_trade(&mut self) {
        if self.positions.ongoing_position() {
            return;
        }

        let Some(evaluation) = self.strategy.evaluate(self.aggregator.candles()) else {
            tracing::debug!(
                "Indicators unavailable ({}/{} candles)",
                self.aggregator.len(),
                self.strategy.min_candles_required()
            );
            return;
        };

        if evaluation.signal == Signal::None {
            return;
        }

        self.log(format!(
            "{:?} signal on {} (RSI {:.2}, MACD {:.4} / {:.4})",
            evaluation.signal,
            self.symbol,
            evaluation.indicators.rsi,
            evaluation.indicators.macd.line,
            evaluation.indicators.macd.signal
        ));

        match self.positions.open_position(evaluation.signal).await {
            Ok(OpenOutcome::Filled { entry_price, .. }) => {
                self.log(format!("Entry filled at {}", entry_price));
            }
            Ok(OpenOutcome::Pending { order_id, .. }) => {
                self.log(format!("Entry order {} placed, awaiting fill", order_id));
                self.track(order_id);
            }
            Ok(OpenOutcome::Skipped(reason)) => {
                tracing::debug!("Entry skipped: {}", reason);
            }
            Err(e) => {
                tracing::error!("Failed to open position: {}", e);
            }
        }
    }

    fn track(&mut self, order_id: u64) {
        self.trackers.retain(|tracker| !tracker.is_finished());

        let fill_tx = self.fill_tx.clone();
        let tracker = self.tracker.track_fill(order_id, move |outcome| {
            if let Some(tx) = fill_tx.upgrade() {
                let event = match outcome {
                    FillOutcome::Filled {
                        order_id,
                        avg_price,
                    } => StrategyEvent::OrderFilled {
                        order_id,
                        avg_price,
                    },
                    FillOutcome::TimedOut { order_id, attempts } => {
                        StrategyEvent::FillTimedOut { order_id, attempts }
                    }
                };
                let _ = tx.send(event);
            }
        });
        self.trackers.push(tracker);
    }

    fn on_fill(&mut self, order_id: u64, avg_price: f64) {
        match self.positions.record_fill(order_id, avg_price) {
            Ok(true) => self.log(format!("Order {} filled at {}", order_id, avg_price)),
            Ok(false) => {}
            Err(e) => tracing::error!("Failed to record fill: {}", e),
        }
    }

    /// Cancel, then confirm the final order state before giving up on the entry
    async fn on_fill_timeout(&mut self, order_id: u64, attempts: u32) {
        if let Err(e) = self.gateway.cancel_orders(&self.symbol).await {
            tracing::error!("Failed to cancel orders on {}: {}", self.symbol, e);
        }

        let state = match self.gateway.order_status(&self.symbol, order_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(order_id, "Final status check failed, tracking again: {}", e);
                self.track(order_id);
                return;
            }
        };

        match (state.status.is_filled(), state.avg_price) {
            (true, Some(avg_price)) => {
                self.log(format!(
                    "Order {} filled at {} while being cancelled",
                    order_id, avg_price
                ));
                self.on_fill(order_id, avg_price);
            }
            (true, None) => {
                tracing::warn!(order_id, "Order filled without an average price, tracking again");
                self.track(order_id);
            }
            (false, _) => match self.positions.expire_pending(order_id) {
                Ok(true) => self.log(format!(
                    "Order {} not filled after {} polls, trade abandoned",
                    order_id, attempts
                )),
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to expire order {}: {}", order_id, e),
            },
        }
    }

    fn log(&mut self, message: String) {
        tracing::info!("{}", message);
        self.journal.push_back(StrategyLog {
            at: Utc::now(),
            message,
        });
        while self.journal.len() > self.journal_len {
            self.journal.pop_front();
        }
    }

    pub fn candles(&self) -> &[Candle] {
        self.aggregator.candles()
    }

    pub fn trades(&self) -> &[Trade] {
        self.positions.all_trades()
    }

    pub fn ongoing_position(&self) -> bool {
        self.positions.ongoing_position()
    }

    pub fn snapshot(&self) -> StrategySnapshot {
        StrategySnapshot {
            candles: self.aggregator.candles().to_vec(),
            trades: self.positions.all_trades().to_vec(),
            ongoing_position: self.positions.ongoing_position(),
            total_pnl: self.positions.total_pnl(),
            journal: self.journal.iter().cloned().collect(),
        }
    }
}

impl<S: Strategy> Drop for StrategyOrchestrator<S> {
    fn drop(&mut self) {
        for tracker in &self.trackers {
            tracker.abort();
        }
    }
}
