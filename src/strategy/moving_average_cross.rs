use std::collections::HashMap;

use super::{
    signals::{closes, crossed_above, crossed_below, ensure_lookback},
    SignalStrategy,
};
use crate::error::Result;
use crate::indicators::sma_series;
use crate::models::{Bar, Signal, SignalReading};

/// Bars requested beyond the slow SMA length
const LOOKBACK_MARGIN: usize = 10;

/// Fast/slow simple moving average crossover
///
/// Fires on the bar where the fast SMA crosses the slow SMA, comparing bar t
/// against bar t-1. A fast SMA that simply stays above the slow one is FLAT.
#[derive(Debug, Clone)]
pub struct MovingAverageCrossStrategy {
    fast_length: usize,
    slow_length: usize,
}

impl MovingAverageCrossStrategy {
    pub fn new(fast_length: usize, slow_length: usize) -> Self {
        Self {
            fast_length,
            slow_length,
        }
    }
}

impl Default for MovingAverageCrossStrategy {
    fn default() -> Self {
        Self::new(1, 50)
    }
}

/// Crossover signal at index `t` of two aligned series
pub fn crossover_signal(fast: &[f64], slow: &[f64], t: usize) -> Signal {
    if t == 0 || t >= fast.len() || t >= slow.len() {
        return Signal::Flat;
    }

    if crossed_above(fast[t - 1], slow[t - 1], fast[t], slow[t]) {
        Signal::Long
    } else if crossed_below(fast[t - 1], slow[t - 1], fast[t], slow[t]) {
        Signal::Short
    } else {
        Signal::Flat
    }
}

impl SignalStrategy for MovingAverageCrossStrategy {
    fn compute(&self, bars: &[Bar]) -> Result<SignalReading> {
        ensure_lookback(bars, self.required_lookback())?;

        let prices = closes(bars);
        let fast = sma_series(&prices, self.fast_length);
        let slow = sma_series(&prices, self.slow_length);
        let t = prices.len() - 1;

        let signal = crossover_signal(&fast, &slow, t);

        tracing::debug!(
            fast_sma = fast[t],
            slow_sma = slow[t],
            %signal,
            "Moving average cross evaluated"
        );

        let mut metrics = HashMap::new();
        metrics.insert("fast_sma".to_string(), fast[t]);
        metrics.insert("slow_sma".to_string(), slow[t]);

        Ok(SignalReading {
            signal,
            timestamp: bars[t].open_time,
            metrics,
        })
    }

    fn name(&self) -> &str {
        "MovingAverageCross"
    }

    fn required_lookback(&self) -> usize {
        self.fast_length.max(self.slow_length) + LOOKBACK_MARGIN
    }
}
