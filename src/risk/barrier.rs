use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BotError, Result};
use crate::models::PositionSide;

/// Metric name a strategy uses to publish its volatility-derived take-profit
pub const DYNAMIC_TAKE_PROFIT_METRIC: &str = "dynamic_take_profit";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

/// Where a position's take-profit comes from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TakeProfitSource {
    /// The configured fraction
    Static,
    /// The strategy's `dynamic_take_profit` metric, falling back to the configured fraction
    Dynamic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrailingStop {
    /// Favorable excursion (fraction of entry) that arms the trailing stop
    pub activation_delta: f64,
    /// Retracement from the best excursion that closes the position
    pub trailing_delta: f64,
}

/// Barrier parameters as they appear in configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub time_limit_secs: Option<u64>,
    pub trailing_stop: Option<TrailingStop>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss: Some(0.02),         // 2%
            take_profit: Some(0.03),       // 3%
            time_limit_secs: Some(45 * 60), // 45 minutes
            trailing_stop: Some(TrailingStop {
                activation_delta: 0.01,
                trailing_delta: 0.003,
            }),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
            (
                "trailing_stop.activation_delta",
                self.trailing_stop.map(|t| t.activation_delta),
            ),
            (
                "trailing_stop.trailing_delta",
                self.trailing_stop.map(|t| t.trailing_delta),
            ),
        ];

        for (name, value) in fractions {
            if let Some(v) = value {
                if !(v > 0.0) {
                    return Err(BotError::InvalidConfiguration(format!(
                        "{} must be positive, got {}",
                        name, v
                    )));
                }
            }
        }

        if self.time_limit_secs == Some(0) {
            return Err(BotError::InvalidConfiguration(
                "time_limit_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Why a position closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CloseType {
    StopLoss,
    TakeProfit,
    TimeLimit,
    TrailingStop,
    /// Closed by an explicit stop action
    EarlyStop,
}

/// Composite exit rule attached to a position at creation
///
/// Frozen once built: later configuration changes never reach an open position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskBarrierSpec {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub time_limit: Option<Duration>,
    pub trailing_stop: Option<TrailingStop>,
    pub open_order_type: OrderType,
    pub take_profit_order_type: OrderType,
    pub stop_loss_order_type: OrderType,
    pub time_limit_order_type: OrderType,
}

/// Build the barrier for a new position from configuration and live metrics
pub fn build_barrier(
    config: &RiskConfig,
    metrics: &HashMap<String, f64>,
    source: TakeProfitSource,
) -> RiskBarrierSpec {
    let take_profit = match source {
        TakeProfitSource::Static => config.take_profit,
        TakeProfitSource::Dynamic => match metrics.get(DYNAMIC_TAKE_PROFIT_METRIC) {
            Some(&tp) if tp.is_finite() && tp > 0.0 => Some(tp),
            _ => {
                tracing::warn!(
                    "No usable {} metric, using configured take profit",
                    DYNAMIC_TAKE_PROFIT_METRIC
                );
                config.take_profit
            }
        },
    };

    RiskBarrierSpec {
        stop_loss: config.stop_loss,
        take_profit,
        time_limit: config.time_limit_secs.map(Duration::from_secs),
        trailing_stop: config.trailing_stop,
        open_order_type: OrderType::Market,
        take_profit_order_type: OrderType::Limit,
        stop_loss_order_type: OrderType::Market,
        time_limit_order_type: OrderType::Market,
    }
}

/// Best favorable excursion seen by a running position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrailingTracker {
    pub activated: bool,
    pub best_pnl_pct: f64,
}

/// Unrealized return of a position as a fraction of entry
pub fn pnl_pct(side: PositionSide, entry_price: f64, price: f64) -> f64 {
    side.direction() * (price - entry_price) / entry_price
}

impl RiskBarrierSpec {
    /// Check the barrier against the current price
    ///
    /// Updates `tracker` with the best excursion so far. Stop-loss wins over
    /// take-profit, then time limit, then trailing stop.
    pub fn evaluate(
        &self,
        side: PositionSide,
        entry_price: f64,
        price: f64,
        elapsed: Duration,
        tracker: &mut TrailingTracker,
    ) -> Option<CloseType> {
        let pnl = pnl_pct(side, entry_price, price);

        if let Some(sl) = self.stop_loss {
            if pnl <= -sl {
                return Some(CloseType::StopLoss);
            }
        }

        if let Some(tp) = self.take_profit {
            if pnl >= tp {
                return Some(CloseType::TakeProfit);
            }
        }

        if let Some(limit) = self.time_limit {
            if elapsed >= limit {
                return Some(CloseType::TimeLimit);
            }
        }

        if let Some(trailing) = self.trailing_stop {
            if !tracker.activated {
                if pnl > trailing.activation_delta {
                    tracker.activated = true;
                    tracker.best_pnl_pct = pnl;
                }
            } else {
                if pnl > tracker.best_pnl_pct {
                    tracker.best_pnl_pct = pnl;
                }
                if pnl < tracker.best_pnl_pct - trailing.trailing_delta {
                    return Some(CloseType::TrailingStop);
                }
            }
        }

        None
    }
}
