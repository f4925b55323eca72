use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MarketKey, PositionSide};
use crate::risk::{CloseType, RiskBarrierSpec};

/// Everything the executor runtime needs to open and manage one position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub market: MarketKey,
    pub side: PositionSide,
    /// Reference price at decision time
    pub entry_price: f64,
    /// Base amount: order_amount_quote * leverage / entry_price
    pub amount: f64,
    pub leverage: u32,
    pub barrier: RiskBarrierSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExecutorAction {
    pub config: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopExecutorAction {
    pub executor_id: Uuid,
    pub market: MarketKey,
}

/// Actions proposed by one evaluation cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleActions {
    pub create: Vec<CreateExecutorAction>,
    pub stop: Vec<StopExecutorAction>,
}

impl CycleActions {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.stop.is_empty()
    }

    pub fn extend(&mut self, other: CycleActions) {
        self.create.extend(other.create);
        self.stop.extend(other.stop);
    }
}

/// Status change reported back by the executor runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutorEvent {
    /// Entry order filled
    Activated { fill_price: f64 },
    Closed { close_type: CloseType, exit_price: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorUpdate {
    pub executor_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: ExecutorEvent,
}
