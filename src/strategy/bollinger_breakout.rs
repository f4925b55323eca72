use std::collections::HashMap;

use super::{
    signals::{closes, ensure_lookback},
    SignalStrategy,
};
use crate::error::Result;
use crate::indicators::calculate_bollinger_series;
use crate::models::{Bar, Signal, SignalReading};
use crate::risk::TakeProfitSource;

/// Bars requested beyond the band length
const LOOKBACK_MARGIN: usize = 5;

/// Percent-B breakout with a volatility-derived take-profit
///
/// A SHORT fires when %B falls back under the upper band, comparing bar t-2
/// against bar t-1, so the signal lags the re-entry by one bar. The mirrored
/// LONG (re-entry above the lower band) only fires when long entries are
/// enabled. Both require `bandwidth / 200` on bar t to exceed the minimum
/// take-profit, which keeps the strategy quiet in dead markets.
#[derive(Debug, Clone)]
pub struct BollingerBreakoutStrategy {
    length: usize,
    std_dev: f64,
    enable_long: bool,
    min_take_profit: f64,
    use_dynamic_take_profit: bool,
}

impl BollingerBreakoutStrategy {
    pub fn new(length: usize, std_dev: f64) -> Self {
        Self {
            length,
            std_dev,
            enable_long: false,
            min_take_profit: 0.001,
            use_dynamic_take_profit: true,
        }
    }

    pub fn with_long_entries(mut self, enabled: bool) -> Self {
        self.enable_long = enabled;
        self
    }

    pub fn with_min_take_profit(mut self, min_take_profit: f64) -> Self {
        self.min_take_profit = min_take_profit;
        self
    }

    pub fn with_dynamic_take_profit(mut self, enabled: bool) -> Self {
        self.use_dynamic_take_profit = enabled;
        self
    }
}

impl Default for BollingerBreakoutStrategy {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

/// Take-profit fraction implied by a Bollinger bandwidth (in percent)
pub fn dynamic_take_profit(bandwidth: f64) -> f64 {
    bandwidth / 200.0
}

/// Breakout signal at index `t` of a %B series
///
/// `take_profit` is the dynamic take-profit of bar t.
pub fn breakout_signal(
    percent_b: &[f64],
    take_profit: f64,
    t: usize,
    enable_long: bool,
    min_take_profit: f64,
) -> Signal {
    if t < 2 || t >= percent_b.len() {
        return Signal::Flat;
    }

    let before = percent_b[t - 2];
    let after = percent_b[t - 1];
    let volatile_enough = take_profit > min_take_profit;

    let short_condition = before >= 1.0 && after < 1.0 && volatile_enough;
    let long_condition = before <= 0.0 && after > 0.0 && volatile_enough;

    if short_condition {
        Signal::Short
    } else if long_condition && enable_long {
        Signal::Long
    } else {
        Signal::Flat
    }
}

impl SignalStrategy for BollingerBreakoutStrategy {
    fn compute(&self, bars: &[Bar]) -> Result<SignalReading> {
        ensure_lookback(bars, self.required_lookback())?;

        let prices = closes(bars);
        let bands = calculate_bollinger_series(&prices, self.length, self.std_dev);
        let percent_b: Vec<f64> = bands.iter().map(|p| p.percent_b).collect();
        let t = prices.len() - 1;

        let take_profit = dynamic_take_profit(bands[t].bandwidth);
        let signal = breakout_signal(
            &percent_b,
            take_profit,
            t,
            self.enable_long,
            self.min_take_profit,
        );

        tracing::debug!(
            percent_b = percent_b[t],
            bandwidth = bands[t].bandwidth,
            take_profit,
            %signal,
            "Bollinger breakout evaluated"
        );

        let mut metrics = HashMap::new();
        metrics.insert("percent_b".to_string(), percent_b[t]);
        metrics.insert("bandwidth".to_string(), bands[t].bandwidth);
        metrics.insert("dynamic_take_profit".to_string(), take_profit);

        Ok(SignalReading {
            signal,
            timestamp: bars[t].open_time,
            metrics,
        })
    }

    fn name(&self) -> &str {
        "BollingerBreakout"
    }

    fn required_lookback(&self) -> usize {
        self.length + LOOKBACK_MARGIN
    }

    fn take_profit_source(&self) -> TakeProfitSource {
        if self.use_dynamic_take_profit {
            TakeProfitSource::Dynamic
        } else {
            TakeProfitSource::Static
        }
    }
}
