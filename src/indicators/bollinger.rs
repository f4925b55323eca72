/// Bollinger Bands over a rolling window of closes
///
/// Uses the population standard deviation (divides by N).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerPoint {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
    /// Band width as a percentage of the middle band: 100 * (upper - lower) / middle
    pub bandwidth: f64,
    /// Position of the close inside the bands: 0 at the lower band, 1 at the upper band
    pub percent_b: f64,
}

impl BollingerPoint {
    fn nan() -> Self {
        Self {
            lower: f64::NAN,
            middle: f64::NAN,
            upper: f64::NAN,
            bandwidth: f64::NAN,
            percent_b: f64::NAN,
        }
    }
}

/// Calculate Bollinger Bands at every index of `prices`
///
/// Points before the window fills are all-NaN. A flat window yields a NaN %B
/// (zero band width), which never satisfies a crossing condition.
pub fn calculate_bollinger_series(prices: &[f64], period: usize, std_dev: f64) -> Vec<BollingerPoint> {
    let mut series = vec![BollingerPoint::nan(); prices.len()];
    if period == 0 {
        return series;
    }

    for end in period..=prices.len() {
        let window = &prices[end - period..end];
        let middle = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|p| {
                let diff = p - middle;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;
        let deviation = std_dev * variance.sqrt();

        let upper = middle + deviation;
        let lower = middle - deviation;
        let close = prices[end - 1];

        series[end - 1] = BollingerPoint {
            lower,
            middle,
            upper,
            bandwidth: 100.0 * (upper - lower) / middle,
            percent_b: (close - lower) / (upper - lower),
        };
    }

    series
}
