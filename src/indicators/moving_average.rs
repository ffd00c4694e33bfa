/// Exponentially weighted mean over a series, bias-adjusted
///
/// Each output is `sum(w_i * x_{t-i}) / sum(w_i)` with `w_i = (1 - alpha)^i`,
/// which weights the seed value correctly instead of treating the first sample
/// as a full-history average. Outputs before `min_periods` observations are `None`.
pub fn ewm_mean(values: &[f64], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let decay = 1.0 - alpha;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    values
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            weighted_sum = x + decay * weighted_sum;
            weight_total = 1.0 + decay * weight_total;
            if i + 1 >= min_periods.max(1) {
                Some(weighted_sum / weight_total)
            } else {
                None
            }
        })
        .collect()
}

/// EMA series parameterised by span (`alpha = 2 / (span + 1)`)
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    ewm_mean(values, alpha, 0)
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
}

/// EMA series parameterised by center of mass (`alpha = 1 / (1 + com)`)
pub fn ewm_com(values: &[f64], com: f64, min_periods: usize) -> Vec<Option<f64>> {
    ewm_mean(values, 1.0 / (1.0 + com), min_periods)
}
