// Technical indicators module
// Implements RSI and MACD over the closed-candle close series

pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use macd::{calculate_macd, Macd};
pub use moving_average::{ema_series, ewm_mean};
pub use rsi::{calculate_rsi, rsi_series};

use crate::models::Candle;

/// Indicator lengths used by the strategy
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub rsi_length: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_length: 14,
            ema_fast: 12,
            ema_slow: 26,
            ema_signal: 9,
        }
    }
}

impl IndicatorConfig {
    /// Minimum number of candles (including the forming one) before any
    /// indicator is trusted
    pub fn min_candles(&self) -> usize {
        self.rsi_length
            .max(self.ema_fast)
            .max(self.ema_slow)
            .max(self.ema_signal)
            + 2
    }
}

/// Indicator values for the last closed candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd: Macd,
}

/// Computes indicators from a candle sequence whose last element is still forming
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Returns `None` while history is too short or a value is undefined
    pub fn compute(&self, candles: &[Candle]) -> Option<IndicatorSnapshot> {
        if candles.len() < self.config.min_candles() {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = calculate_rsi(&closes, self.config.rsi_length)?;
        let macd = calculate_macd(
            &closes,
            self.config.ema_fast,
            self.config.ema_slow,
            self.config.ema_signal,
        )?;

        Some(IndicatorSnapshot { rsi, macd })
    }
}
