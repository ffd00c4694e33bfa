// Trading strategy module
pub mod signals;
pub mod technical;

pub use signals::{SignalConfig, SignalEvaluator};
pub use technical::TechnicalStrategy;

use crate::indicators::IndicatorSnapshot;
use crate::models::{Candle, Signal};

/// Indicator readings and the decision taken from them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub indicators: IndicatorSnapshot,
    pub signal: Signal,
}

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate the candle history; the last candle is treated as still forming.
    /// Returns `None` when indicators are not yet available.
    fn evaluate(&self, candles: &[Candle]) -> Option<Evaluation>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
