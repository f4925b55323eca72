/// SMA evaluated at every index of `prices`
///
/// Indices before the window fills are NaN, so a comparison against them
/// is always false.
pub fn sma_series(prices: &[f64], period: usize) -> Vec<f64> {
    let mut series = vec![f64::NAN; prices.len()];
    if period == 0 {
        return series;
    }

    for end in period..=prices.len() {
        let window = &prices[end - period..end];
        series[end - 1] = window.iter().sum::<f64>() / period as f64;
    }

    series
}
