use crate::models::Signal;

/// RSI thresholds for the directional decision
///
/// The thresholds are deliberately asymmetric (30 / 40).
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub rsi_long_below: f64,
    pub rsi_short_above: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_long_below: 30.0,
            rsi_short_above: 40.0,
        }
    }
}

/// Maps an RSI reading to a trade direction
#[derive(Debug, Clone, Default)]
pub struct SignalEvaluator {
    config: SignalConfig,
}

impl SignalEvaluator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, rsi: f64) -> Signal {
        if rsi < self.config.rsi_long_below {
            Signal::Long
        } else if rsi > self.config.rsi_short_above {
            Signal::Short
        } else {
            Signal::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let evaluator = SignalEvaluator::default();
        assert_eq!(evaluator.evaluate(29.99), Signal::Long);
        assert_eq!(evaluator.evaluate(40.01), Signal::Short);
        assert_eq!(evaluator.evaluate(35.0), Signal::None);
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        let evaluator = SignalEvaluator::default();
        assert_eq!(evaluator.evaluate(30.0), Signal::None);
        assert_eq!(evaluator.evaluate(40.0), Signal::None);
    }

    #[test]
    fn test_custom_thresholds() {
        let evaluator = SignalEvaluator::new(SignalConfig {
            rsi_long_below: 20.0,
            rsi_short_above: 80.0,
        });
        assert_eq!(evaluator.evaluate(25.0), Signal::None);
        assert_eq!(evaluator.evaluate(85.0), Signal::Short);
    }
}
