// Technical indicators module
// Implements SMA and Bollinger Bands for the signal strategies

pub mod bollinger;
pub mod moving_average;

pub use bollinger::{calculate_bollinger_series, BollingerPoint};
pub use moving_average::sma_series;
