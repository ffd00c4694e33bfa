use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::api::ExchangeGateway;

/// How often and how long to poll for an entry fill
#[derive(Debug, Clone, PartialEq)]
pub struct FillPolicy {
    pub poll_interval: Duration,
    /// `None` polls until the order fills
    pub max_attempts: Option<u32>,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_attempts: Some(150),
        }
    }
}

/// Terminal result of tracking one order
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled { order_id: u64, avg_price: f64 },
    TimedOut { order_id: u64, attempts: u32 },
}

/// Poll `order_id` until it reports a fill or the attempt budget runs out
///
/// Each poll is independent: a gateway error only schedules the next one.
pub async fn poll_until_filled(
    gateway: &dyn ExchangeGateway,
    symbol: &str,
    order_id: u64,
    policy: &FillPolicy,
) -> FillOutcome {
    let mut attempts = 0u32;

    loop {
        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            return FillOutcome::TimedOut { order_id, attempts };
        }

        tokio::time::sleep(policy.poll_interval).await;
        attempts += 1;

        match gateway.order_status(symbol, order_id).await {
            Ok(state) => {
                tracing::info!(order_id, status = ?state.status, "Order status");
                match (state.status.is_filled(), state.avg_price) {
                    (true, Some(avg_price)) => {
                        return FillOutcome::Filled {
                            order_id,
                            avg_price,
                        }
                    }
                    (true, None) => {
                        tracing::warn!(order_id, "Order filled without an average price, polling again");
                    }
                    (false, _) => {}
                }
            }
            Err(e) => {
                tracing::warn!(order_id, attempt = attempts, "Order status poll failed: {}", e);
            }
        }
    }
}

/// Spawns one polling task per unfilled entry order
///
/// Trackers never touch trade state; they report through the callback only.
#[derive(Clone)]
pub struct OrderFillTracker {
    gateway: Arc<dyn ExchangeGateway>,
    symbol: String,
    policy: FillPolicy,
}

impl OrderFillTracker {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, symbol: impl Into<String>, policy: FillPolicy) -> Self {
        Self {
            gateway,
            symbol: symbol.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &FillPolicy {
        &self.policy
    }

    /// Start tracking; `on_outcome` runs exactly once, from the polling task
    pub fn track_fill<F>(&self, order_id: u64, on_outcome: F) -> JoinHandle<()>
    where
        F: FnOnce(FillOutcome) + Send + 'static,
    {
        let gateway = self.gateway.clone();
        let symbol = self.symbol.clone();
        let policy = self.policy.clone();

        tracing::info!(order_id, "Tracking entry fill");

        tokio::spawn(async move {
            let outcome = poll_until_filled(gateway.as_ref(), &symbol, order_id, &policy).await;
            on_outcome(outcome);
        })
    }
}
