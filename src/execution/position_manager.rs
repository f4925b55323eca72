use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::actions::{ExecutorConfig, ExecutorEvent, ExecutorUpdate};
use crate::error::{BotError, Result};
use crate::models::{MarketKey, PositionSide};
use crate::risk::{CloseType, RiskBarrierSpec};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionStatus {
    /// Create action emitted, entry not filled yet
    Pending,
    Active,
    /// Stop action emitted, close not confirmed yet
    Closing,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Pending => write!(f, "PENDING"),
            PositionStatus::Active => write!(f, "ACTIVE"),
            PositionStatus::Closing => write!(f, "CLOSING"),
            PositionStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A position created by the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub market: MarketKey,
    pub side: PositionSide,
    pub entry_price: f64, // Reference price at creation
    pub size: f64,
    pub leverage: u32,
    pub barrier: RiskBarrierSpec, // Frozen at creation
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
    pub fill_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_type: Option<CloseType>,
}

impl Position {
    /// Pending or active: counts towards the one-per-side limit
    pub fn is_active(&self) -> bool {
        matches!(self.status, PositionStatus::Pending | PositionStatus::Active)
    }

    fn transition(&mut self, to: PositionStatus) -> Result<()> {
        use PositionStatus::*;

        let allowed = matches!(
            (self.status, to),
            (Pending, Active) | (Pending, Closing) | (Active, Closing)
                | (Pending, Closed) | (Active, Closed) | (Closing, Closed)
        );

        if !allowed {
            return Err(BotError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.status = to;
        Ok(())
    }
}

/// Closed positions kept for inspection before the oldest are dropped
pub const DEFAULT_CLOSED_RETENTION: usize = 500;

/// The set of positions owned by one controller
///
/// Positions are never reused: once closed, a new position on the same
/// side gets a new id. Only the most recent closed positions are kept.
#[derive(Debug)]
pub struct PositionManager {
    positions: Vec<Position>,
    closed_retention: usize,
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::with_closed_retention(DEFAULT_CLOSED_RETENTION)
    }
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_closed_retention(closed_retention: usize) -> Self {
        Self {
            positions: Vec::new(),
            closed_retention,
        }
    }

    /// Get all positions (including closed ones)
    pub fn all_positions(&self) -> &[Position] {
        &self.positions
    }

    /// Get position by ID
    pub fn get_position(&self, id: Uuid) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    fn get_position_mut(&mut self, id: Uuid) -> Result<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(BotError::UnknownExecutor(id))
    }

    /// Record a position for a create action
    ///
    /// Fails if the market already has a pending or active position on that side.
    pub fn open_pending(&mut self, config: &ExecutorConfig) -> Result<Uuid> {
        if self.has_active_position(&config.market, config.side) {
            return Err(BotError::DuplicatePosition {
                market: config.market.to_string(),
                side: config.side.to_string(),
            });
        }

        self.positions.push(Position {
            id: config.id,
            market: config.market.clone(),
            side: config.side,
            entry_price: config.entry_price,
            size: config.amount,
            leverage: config.leverage,
            barrier: config.barrier.clone(),
            status: PositionStatus::Pending,
            created_at: config.timestamp,
            fill_price: None,
            exit_price: None,
            closed_at: None,
            close_type: None,
        });

        Ok(config.id)
    }

    /// Check if a market has a pending or active position on a side
    pub fn has_active_position(&self, market: &MarketKey, side: PositionSide) -> bool {
        self.positions
            .iter()
            .any(|p| &p.market == market && p.side == side && p.is_active())
    }

    /// Pending and active positions of a market, split into (longs, shorts)
    pub fn active_by_side(&self, market: &MarketKey) -> (Vec<&Position>, Vec<&Position>) {
        self.positions
            .iter()
            .filter(|p| &p.market == market && p.is_active())
            .partition(|p| p.side == PositionSide::Long)
    }

    /// Mark a position as closing after a stop action was issued
    pub fn mark_closing(&mut self, id: Uuid) -> Result<()> {
        self.get_position_mut(id)?.transition(PositionStatus::Closing)
    }

    /// Drop a pending position the runtime never accepted
    pub fn abandon(&mut self, id: Uuid) -> Result<()> {
        let position = self.get_position_mut(id)?;
        if position.status != PositionStatus::Pending {
            return Err(BotError::InvalidTransition {
                from: position.status.to_string(),
                to: PositionStatus::Closed.to_string(),
            });
        }

        position.status = PositionStatus::Closed;
        self.prune_closed();
        Ok(())
    }

    /// Undo `mark_closing` after the stop action was not delivered
    ///
    /// The position returns to ACTIVE if its entry was filled, PENDING otherwise.
    pub fn revert_closing(&mut self, id: Uuid) -> Result<()> {
        let position = self.get_position_mut(id)?;
        if position.status != PositionStatus::Closing {
            return Err(BotError::InvalidTransition {
                from: position.status.to_string(),
                to: PositionStatus::Active.to_string(),
            });
        }

        position.status = if position.fill_price.is_some() {
            PositionStatus::Active
        } else {
            PositionStatus::Pending
        };
        Ok(())
    }

    /// Apply a status change reported by the executor runtime
    pub fn apply_update(&mut self, update: &ExecutorUpdate) -> Result<()> {
        let position = self.get_position_mut(update.executor_id)?;

        match update.event {
            ExecutorEvent::Activated { fill_price } => {
                position.fill_price = Some(fill_price);
                // A stop may have been issued before the fill was reported
                if position.status != PositionStatus::Closing {
                    position.transition(PositionStatus::Active)?;
                }
            }
            ExecutorEvent::Closed {
                close_type,
                exit_price,
            } => {
                position.transition(PositionStatus::Closed)?;
                position.close_type = Some(close_type);
                position.exit_price = Some(exit_price);
                position.closed_at = Some(update.timestamp);
                self.prune_closed();
            }
        }

        Ok(())
    }

    fn prune_closed(&mut self) {
        let closed = self
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Closed)
            .count();
        let mut excess = closed.saturating_sub(self.closed_retention);
        if excess == 0 {
            return;
        }

        // Oldest first: positions are kept in creation order
        self.positions.retain(|p| {
            if excess > 0 && p.status == PositionStatus::Closed {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    /// Get all positions that are not closed yet
    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions
            .iter()
            .filter(|p| p.status != PositionStatus::Closed)
            .collect()
    }
}
