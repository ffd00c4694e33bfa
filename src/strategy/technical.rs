use super::{
    signals::{SignalConfig, SignalEvaluator},
    Evaluation, Strategy,
};
use crate::indicators::{IndicatorConfig, IndicatorEngine};
use crate::models::Candle;

/// RSI + MACD strategy
///
/// MACD is computed and reported with every evaluation but does not gate the
/// decision; only RSI does.
#[derive(Debug, Clone, Default)]
pub struct TechnicalStrategy {
    engine: IndicatorEngine,
    evaluator: SignalEvaluator,
}

impl TechnicalStrategy {
    pub fn new(indicators: IndicatorConfig, signals: SignalConfig) -> Self {
        Self {
            engine: IndicatorEngine::new(indicators),
            evaluator: SignalEvaluator::new(signals),
        }
    }
}

impl Strategy for TechnicalStrategy {
    fn evaluate(&self, candles: &[Candle]) -> Option<Evaluation> {
        let indicators = self.engine.compute(candles)?;
        let signal = self.evaluator.evaluate(indicators.rsi);

        tracing::debug!(
            rsi = indicators.rsi,
            macd_line = indicators.macd.line,
            macd_signal = indicators.macd.signal,
            ?signal,
            "Evaluated indicators"
        );

        Some(Evaluation { indicators, signal })
    }

    fn name(&self) -> &str {
        "RSI+MACD"
    }

    fn min_candles_required(&self) -> usize {
        self.engine.config().min_candles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;

    fn create_test_candles(prices: &[f64]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| {
                let open_time = i as i64 * 60_000;
                Candle::seeded(open_time, open_time + 59_999, price, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_insufficient_history_gives_no_evaluation() {
        let strategy = TechnicalStrategy::default();
        let candles = create_test_candles(&[100.0, 101.0, 99.0]);
        assert!(strategy.evaluate(&candles).is_none());
    }

    #[test]
    fn test_falling_market_is_long() {
        let strategy = TechnicalStrategy::default();
        let prices: Vec<f64> = (0..40).map(|i| 200.0 - i as f64 * 2.0).collect();
        let eval = strategy.evaluate(&create_test_candles(&prices)).unwrap();
        assert!(eval.indicators.rsi < 30.0);
        assert_eq!(eval.signal, Signal::Long);
    }

    #[test]
    fn test_rising_market_is_short() {
        let strategy = TechnicalStrategy::default();
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let eval = strategy.evaluate(&create_test_candles(&prices)).unwrap();
        assert_eq!(eval.signal, Signal::Short);
    }

    #[test]
    fn test_min_candles_required() {
        let strategy = TechnicalStrategy::default();
        assert_eq!(strategy.min_candles_required(), 28);
        assert_eq!(strategy.name(), "RSI+MACD");
    }
}
