// Signal strategy module
pub mod bollinger_breakout;
pub mod moving_average_cross;
pub mod signals;

pub use bollinger_breakout::BollingerBreakoutStrategy;
pub use moving_average_cross::MovingAverageCrossStrategy;

use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::models::{Bar, SignalReading};
use crate::risk::TakeProfitSource;

/// Base trait for all signal strategies
///
/// `compute` is a pure function of the bar window: it never blocks and never
/// keeps state between cycles.
pub trait SignalStrategy: Send + Sync {
    /// Evaluate the window and report the signal on its newest bar
    fn compute(&self, bars: &[Bar]) -> Result<SignalReading>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum bars `compute` accepts; also how many bars to request
    fn required_lookback(&self) -> usize;

    /// Where the take-profit of positions opened on this strategy's signal comes from
    fn take_profit_source(&self) -> TakeProfitSource {
        TakeProfitSource::Static
    }
}

/// Strategy selection as it appears in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    MovingAverageCross {
        #[serde(default = "default_fast_length")]
        fast_length: usize,
        #[serde(default = "default_slow_length")]
        slow_length: usize,
    },
    BollingerBreakout {
        #[serde(default = "default_band_length")]
        length: usize,
        #[serde(default = "default_band_std")]
        std_dev: f64,
        /// Long entries on an upward cross of the lower band; off unless enabled
        #[serde(default)]
        enable_long: bool,
        /// Minimum dynamic take-profit for a signal to fire
        #[serde(default = "default_min_take_profit")]
        min_take_profit: f64,
        /// Use the volatility-derived take-profit in place of the configured one
        #[serde(default = "default_true")]
        use_dynamic_take_profit: bool,
    },
}

fn default_fast_length() -> usize {
    1
}

fn default_slow_length() -> usize {
    50
}

fn default_band_length() -> usize {
    20
}

fn default_band_std() -> f64 {
    2.0
}

fn default_min_take_profit() -> f64 {
    0.001
}

fn default_true() -> bool {
    true
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        match *self {
            StrategyConfig::MovingAverageCross {
                fast_length,
                slow_length,
            } => {
                if fast_length == 0 || slow_length == 0 {
                    return Err(BotError::InvalidConfiguration(
                        "moving average lengths must be positive".to_string(),
                    ));
                }
                if fast_length >= slow_length {
                    return Err(BotError::InvalidConfiguration(format!(
                        "fast_length ({}) must be shorter than slow_length ({})",
                        fast_length, slow_length
                    )));
                }
            }
            StrategyConfig::BollingerBreakout {
                length,
                std_dev,
                min_take_profit,
                ..
            } => {
                if length < 2 {
                    return Err(BotError::InvalidConfiguration(format!(
                        "band length must be at least 2, got {}",
                        length
                    )));
                }
                if !(std_dev > 0.0) {
                    return Err(BotError::InvalidConfiguration(format!(
                        "band std_dev must be positive, got {}",
                        std_dev
                    )));
                }
                if !(min_take_profit >= 0.0) {
                    return Err(BotError::InvalidConfiguration(format!(
                        "min_take_profit must not be negative, got {}",
                        min_take_profit
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate and build the configured strategy
    pub fn build(&self) -> Result<Box<dyn SignalStrategy>> {
        self.validate()?;

        let strategy: Box<dyn SignalStrategy> = match *self {
            StrategyConfig::MovingAverageCross {
                fast_length,
                slow_length,
            } => Box::new(MovingAverageCrossStrategy::new(fast_length, slow_length)),
            StrategyConfig::BollingerBreakout {
                length,
                std_dev,
                enable_long,
                min_take_profit,
                use_dynamic_take_profit,
            } => Box::new(
                BollingerBreakoutStrategy::new(length, std_dev)
                    .with_long_entries(enable_long)
                    .with_min_take_profit(min_take_profit)
                    .with_dynamic_take_profit(use_dynamic_take_profit),
            ),
        };

        Ok(strategy)
    }
}
