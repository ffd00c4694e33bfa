use super::moving_average::ema_series;

/// MACD line and its signal line at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
}

impl Macd {
    pub fn histogram(&self) -> f64 {
        self.line - self.signal
    }
}

/// MACD of the last closed candle (second-to-last element of `prices`)
///
/// `line = EMA(fast) - EMA(slow)`, `signal = EMA(line, signal_period)`.
pub fn calculate_macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<Macd> {
    if prices.len() < 2 {
        return None;
    }

    let ema_fast = ema_series(prices, fast);
    let ema_slow = ema_series(prices, slow);
    let line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema_series(&line, signal_period);

    let idx = prices.len() - 2;
    let macd = Macd {
        line: line[idx],
        signal: signal[idx],
    };

    if macd.line.is_finite() && macd.signal.is_finite() {
        Some(macd)
    } else {
        None
    }
}
