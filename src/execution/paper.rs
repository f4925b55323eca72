use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::actions::{CycleActions, ExecutorConfig, ExecutorEvent, ExecutorUpdate};
use super::{ExecutorRuntime, MarketDataProvider};
use crate::error::Result;
use crate::risk::{pnl_pct, CloseType, TrailingTracker};

#[derive(Debug, Clone)]
struct PaperPosition {
    config: ExecutorConfig,
    opened_at: DateTime<Utc>,
    fill_price: f64,
    tracker: TrailingTracker,
}

/// Simulated executor that fills at the current quote
///
/// Entries fill immediately at mid price. Barriers are checked against the
/// quote on every poll.
pub struct PaperExecutor {
    provider: Arc<dyn MarketDataProvider>,
    open: HashMap<Uuid, PaperPosition>,
    pending: Vec<ExecutorUpdate>,
    realized_pnl: f64,
}

impl PaperExecutor {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            open: HashMap::new(),
            pending: Vec::new(),
            realized_pnl: 0.0,
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Realized P&L in quote currency, leverage included
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    async fn price_or(&self, config: &ExecutorConfig, fallback: f64) -> f64 {
        match self.provider.mid_price(&config.market).await {
            Ok(price) => price,
            Err(e) => {
                tracing::debug!(market = %config.market, "No quote, using {}: {}", fallback, e);
                fallback
            }
        }
    }

    fn close(&mut self, id: Uuid, close_type: CloseType, exit_price: f64, now: DateTime<Utc>) {
        let Some(position) = self.open.remove(&id) else {
            return;
        };

        let pnl = pnl_pct(position.config.side, position.fill_price, exit_price)
            * position.fill_price
            * position.config.amount;
        self.realized_pnl += pnl;

        tracing::info!(
            executor_id = %id,
            market = %position.config.market,
            side = %position.config.side,
            ?close_type,
            entry = position.fill_price,
            exit = exit_price,
            pnl,
            "Paper position closed"
        );

        self.pending.push(ExecutorUpdate {
            executor_id: id,
            timestamp: now,
            event: ExecutorEvent::Closed {
                close_type,
                exit_price,
            },
        });
    }
}

#[async_trait]
impl ExecutorRuntime for PaperExecutor {
    async fn execute(&mut self, actions: &CycleActions) -> Result<()> {
        for stop in &actions.stop {
            let Some(position) = self.open.get(&stop.executor_id) else {
                tracing::warn!(executor_id = %stop.executor_id, "Stop for unknown paper position");
                continue;
            };
            let config = position.config.clone();
            let exit_price = self.price_or(&config, position.fill_price).await;
            self.close(stop.executor_id, CloseType::EarlyStop, exit_price, Utc::now());
        }

        for create in &actions.create {
            let config = create.config.clone();
            let fill_price = self.price_or(&config, config.entry_price).await;

            tracing::info!(
                executor_id = %config.id,
                market = %config.market,
                side = %config.side,
                fill_price,
                amount = config.amount,
                "Paper position opened"
            );

            self.pending.push(ExecutorUpdate {
                executor_id: config.id,
                timestamp: config.timestamp,
                event: ExecutorEvent::Activated { fill_price },
            });
            self.open.insert(
                config.id,
                PaperPosition {
                    opened_at: config.timestamp,
                    config,
                    fill_price,
                    tracker: TrailingTracker::default(),
                },
            );
        }

        Ok(())
    }

    async fn poll_updates(&mut self, now: DateTime<Utc>) -> Result<Vec<ExecutorUpdate>> {
        let mut hits = Vec::new();

        for (id, position) in self.open.iter_mut() {
            let price = match self.provider.mid_price(&position.config.market).await {
                Ok(price) => price,
                Err(_) => continue,
            };

            let elapsed = (now - position.opened_at).to_std().unwrap_or_default();
            if let Some(close_type) = position.config.barrier.evaluate(
                position.config.side,
                position.fill_price,
                price,
                elapsed,
                &mut position.tracker,
            ) {
                hits.push((*id, close_type, price));
            }
        }

        for (id, close_type, price) in hits {
            self.close(id, close_type, price, now);
        }

        Ok(std::mem::take(&mut self.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::actions::{CreateExecutorAction, StopExecutorAction};
    use crate::execution::BarBuffer;
    use crate::models::{MarketKey, PositionSide};
    use crate::risk::{build_barrier, RiskConfig, TakeProfitSource};
    use chrono::Duration;

    fn btc() -> MarketKey {
        MarketKey::new("paper_perpetual", "BTC-USDT")
    }

    fn create(side: PositionSide, now: DateTime<Utc>) -> CreateExecutorAction {
        CreateExecutorAction {
            config: ExecutorConfig {
                id: Uuid::new_v4(),
                timestamp: now,
                market: btc(),
                side,
                entry_price: 100.0,
                amount: 1.0,
                leverage: 20,
                barrier: build_barrier(
                    &RiskConfig::default(),
                    &HashMap::new(),
                    TakeProfitSource::Static,
                ),
            },
        }
    }

    fn setup(price: f64) -> (BarBuffer, PaperExecutor) {
        let buffer = BarBuffer::new(10);
        buffer.set_mid_price(&btc(), price).unwrap();
        let executor = PaperExecutor::new(Arc::new(buffer.clone()));
        (buffer, executor)
    }

    #[tokio::test]
    async fn test_create_fills_at_mid() {
        let (_buffer, mut executor) = setup(101.0);
        let now = Utc::now();
        let action = create(PositionSide::Long, now);
        let id = action.config.id;

        executor
            .execute(&CycleActions {
                create: vec![action],
                stop: vec![],
            })
            .await
            .unwrap();

        let updates = executor.poll_updates(now).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].executor_id, id);
        assert_eq!(updates[0].event, ExecutorEvent::Activated { fill_price: 101.0 });
        assert_eq!(executor.open_count(), 1);

        // drained
        assert!(executor.poll_updates(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_take_profit_closes_long() {
        let (buffer, mut executor) = setup(100.0);
        let now = Utc::now();
        executor
            .execute(&CycleActions {
                create: vec![create(PositionSide::Long, now)],
                stop: vec![],
            })
            .await
            .unwrap();
        executor.poll_updates(now).await.unwrap();

        buffer.set_mid_price(&btc(), 103.5).unwrap();
        let updates = executor.poll_updates(now + Duration::seconds(30)).await.unwrap();

        assert_eq!(updates.len(), 1);
        assert!(matches!(
            updates[0].event,
            ExecutorEvent::Closed { close_type: CloseType::TakeProfit, .. }
        ));
        assert_eq!(executor.open_count(), 0);
        assert!((executor.realized_pnl() - 3.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_time_limit_closes_position() {
        let (_buffer, mut executor) = setup(100.0);
        let now = Utc::now();
        executor
            .execute(&CycleActions {
                create: vec![create(PositionSide::Short, now)],
                stop: vec![],
            })
            .await
            .unwrap();
        executor.poll_updates(now).await.unwrap();

        let updates = executor
            .poll_updates(now + Duration::seconds(2700))
            .await
            .unwrap();
        assert!(matches!(
            updates[0].event,
            ExecutorEvent::Closed { close_type: CloseType::TimeLimit, .. }
        ));
    }

    #[tokio::test]
    async fn test_stop_action_is_early_stop() {
        let (buffer, mut executor) = setup(100.0);
        let now = Utc::now();
        let action = create(PositionSide::Short, now);
        let id = action.config.id;
        executor
            .execute(&CycleActions {
                create: vec![action],
                stop: vec![],
            })
            .await
            .unwrap();
        executor.poll_updates(now).await.unwrap();

        buffer.set_mid_price(&btc(), 99.0).unwrap();
        executor
            .execute(&CycleActions {
                create: vec![],
                stop: vec![StopExecutorAction {
                    executor_id: id,
                    market: btc(),
                }],
            })
            .await
            .unwrap();

        let updates = executor.poll_updates(now).await.unwrap();
        assert_eq!(
            updates,
            vec![ExecutorUpdate {
                executor_id: id,
                timestamp: updates[0].timestamp,
                event: ExecutorEvent::Closed {
                    close_type: CloseType::EarlyStop,
                    exit_price: 99.0,
                },
            }]
        );
        assert!((executor.realized_pnl() - 1.0).abs() < 1e-9);
    }
}
