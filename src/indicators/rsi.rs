use super::moving_average::ewm_com;

/// Relative Strength Index series
///
/// Gains and losses are smoothed with an exponential mean of center of mass
/// `period - 1` and require `period` price changes before producing a value.
/// The output is aligned with `prices` (index 0 is always `None`) and rounded
/// to 2 decimals.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if prices.len() < 2 || period == 0 {
        return vec![None; prices.len()];
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = changes.iter().map(|c| c.max(0.0)).collect();
    let losses: Vec<f64> = changes.iter().map(|c| (-c).max(0.0)).collect();

    let com = (period - 1) as f64;
    let avg_gain = ewm_com(&gains, com, period);
    let avg_loss = ewm_com(&losses, com, period);

    let mut out = Vec::with_capacity(prices.len());
    out.push(None);
    out.extend(
        avg_gain
            .iter()
            .zip(avg_loss.iter())
            .map(|(g, l)| match (g, l) {
                (Some(g), Some(l)) => rsi_from_averages(*g, *l),
                _ => None,
            }),
    );
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        // flat series has no defined strength
        return if avg_gain == 0.0 { None } else { Some(100.0) };
    }
    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);
    Some((rsi * 100.0).round() / 100.0)
}

/// RSI of the last closed candle (second-to-last element of `prices`)
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }
    rsi_series(prices, period)[prices.len() - 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_calculation() {
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5, 46.75, 47.0,
        ];

        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi.is_some());

        let rsi_value = rsi.unwrap();
        assert!(rsi_value > 50.0 && rsi_value < 100.0);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![100.0, 102.0, 101.0];
        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi.is_none());
    }

    #[test]
    fn test_rsi_needs_period_changes_before_last_closed() {
        // 15 prices = 14 changes, but the last change belongs to the open candle
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + (i % 3) as f64).collect();
        assert!(calculate_rsi(&prices, 14).is_none());

        let prices: Vec<f64> = (0..16).map(|i| 100.0 + (i % 3) as f64).collect();
        assert!(calculate_rsi(&prices, 14).is_some());
    }

    #[test]
    fn test_rsi_all_gains() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let rsi = calculate_rsi(&prices, 30);
        assert_eq!(rsi, Some(100.0));
    }

    #[test]
    fn test_rsi_all_losses() {
        let prices: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        assert_eq!(calculate_rsi(&prices, 14), Some(0.0));
    }

    #[test]
    fn test_rsi_bounded() {
        let prices: Vec<f64> = (0..200)
            .map(|i| 100.0 + ((i * 37) % 17) as f64 - ((i * 11) % 7) as f64 * 1.5)
            .collect();

        for value in rsi_series(&prices, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value), "rsi out of range: {}", value);
        }
    }

    #[test]
    fn test_rsi_rounded_to_two_decimals() {
        let prices = vec![
            10.0, 10.3, 10.1, 10.7, 10.2, 10.9, 10.4, 10.8, 10.6, 11.2, 10.9, 11.3, 11.0, 11.6,
            11.1, 11.4, 11.2,
        ];
        let rsi = calculate_rsi(&prices, 14).unwrap();
        assert!(((rsi * 100.0).round() - rsi * 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_rsi_ignores_forming_candle() {
        let mut prices: Vec<f64> = (0..30).map(|i| 100.0 + (i % 4) as f64).collect();
        let before = calculate_rsi(&prices, 14);
        *prices.last_mut().unwrap() = 10_000.0;
        assert_eq!(calculate_rsi(&prices, 14), before);
    }
}
