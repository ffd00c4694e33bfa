use crate::models::{Candle, Tick};

/// Outcome of folding one tick into the candle series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketEvent {
    /// Tick updated the forming candle
    SameBucket,
    /// Tick opened the next candle
    NewBucket,
    /// Flat candles were synthesised for skipped intervals before the tick's candle
    GapFilledThenNew { missing: usize },
}

impl BucketEvent {
    /// Whether a bucket boundary was crossed
    pub fn is_new_bucket(&self) -> bool {
        !matches!(self, BucketEvent::SameBucket)
    }
}

/// Folds ticks into fixed-interval OHLCV candles
///
/// The last candle is the forming one and is updated in place; every earlier
/// candle is closed. Keeps a rolling window of at most `max_candles`.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    candles: Vec<Candle>,
    interval_ms: i64,
    max_candles: usize,
}

impl CandleAggregator {
    /// Create an empty aggregator
    ///
    /// # Arguments
    /// * `interval_ms` - Bucket width in milliseconds
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(interval_ms: i64, max_candles: usize) -> Self {
        Self {
            candles: Vec::new(),
            interval_ms,
            max_candles: max_candles.max(1),
        }
    }

    /// Create an aggregator seeded with exchange history (oldest first)
    pub fn with_history(interval_ms: i64, max_candles: usize, history: Vec<Candle>) -> Self {
        let mut aggregator = Self::new(interval_ms, max_candles);
        aggregator.candles = history;
        aggregator.trim();
        aggregator
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Fold a tick using the wall clock for skew detection
    pub fn ingest(&mut self, tick: Tick) -> BucketEvent {
        self.ingest_at(tick, chrono::Utc::now().timestamp_millis())
    }

    /// Fold a tick; `now_ms` is only used to report clock skew
    pub fn ingest_at(&mut self, tick: Tick, now_ms: i64) -> BucketEvent {
        let lag = now_ms - tick.timestamp;
        if lag > 2 * self.interval_ms {
            tracing::warn!(
                "{} milliseconds of difference between the current time and the trade time",
                lag
            );
        }

        let Some(last) = self.candles.last_mut() else {
            // No history: open a bucket aligned to the interval grid
            let open_time = tick.timestamp - tick.timestamp.rem_euclid(self.interval_ms);
            self.candles.push(Candle::seeded(
                open_time,
                open_time + self.interval_ms - 1,
                tick.price,
                tick.size,
            ));
            return BucketEvent::NewBucket;
        };

        let last_close_time = last.close_time;

        if tick.timestamp < last_close_time + self.interval_ms {
            last.close = tick.price;
            last.volume += tick.size;
            last.high = last.high.max(tick.price);
            last.low = last.low.min(tick.price);
            return BucketEvent::SameBucket;
        }

        if tick.timestamp >= last_close_time + 2 * self.interval_ms {
            let missing = ((tick.timestamp - last_close_time) / self.interval_ms - 1) as usize;
            let flat_price = last.close;

            tracing::info!(
                "Missing {} candles ({} {})",
                missing,
                tick.timestamp,
                last_close_time
            );

            // older synthetic candles would be trimmed straight away
            let synthesized = missing.min(self.max_candles);
            let mut close_time = last_close_time + (missing - synthesized) as i64 * self.interval_ms;
            for _ in 0..synthesized {
                self.candles
                    .push(Candle::seeded(close_time + 1, close_time + self.interval_ms, flat_price, 0.0));
                close_time += self.interval_ms;
            }
            self.push_after(close_time, tick);
            return BucketEvent::GapFilledThenNew { missing };
        }

        self.push_after(last_close_time, tick);
        tracing::info!("New candle at {}", last_close_time + self.interval_ms);
        BucketEvent::NewBucket
    }

    fn push_after(&mut self, prev_close_time: i64, tick: Tick) {
        self.candles.push(Candle::seeded(
            prev_close_time + 1,
            prev_close_time + self.interval_ms,
            tick.price,
            tick.size,
        ));
        self.trim();
    }

    fn trim(&mut self) {
        if self.candles.len() > self.max_candles {
            let excess = self.candles.len() - self.max_candles;
            self.candles.drain(..excess);
        }
    }
}
