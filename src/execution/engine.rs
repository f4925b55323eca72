use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::actions::CycleActions;
use super::controller::PositionLifecycleController;
use super::{ExecutorRuntime, MarketDataProvider, VenueSetup};
use crate::error::{BotError, Result};

/// Drives the controller on a fixed cadence
///
/// Each cycle polls the runtime for status changes, feeds them to the
/// controller, evaluates every market and submits the resulting actions.
pub struct Engine<R: ExecutorRuntime> {
    controller: PositionLifecycleController,
    provider: Arc<dyn MarketDataProvider>,
    runtime: R,
    cycle: Duration,
}

impl<R: ExecutorRuntime> Engine<R> {
    pub fn new(
        controller: PositionLifecycleController,
        provider: Arc<dyn MarketDataProvider>,
        runtime: R,
        cycle: Duration,
    ) -> Self {
        Self {
            controller,
            provider,
            runtime,
            cycle,
        }
    }

    pub fn controller(&self) -> &PositionLifecycleController {
        &self.controller
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Apply venue settings before the first cycle
    pub async fn initialize(&mut self, setup: &dyn VenueSetup) -> Vec<BotError> {
        self.controller.apply_initial_settings(setup).await
    }

    /// Run a single evaluation cycle
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleActions> {
        let updates = self.runtime.poll_updates(now).await?;
        self.controller.apply_updates(&updates);

        let actions = self
            .controller
            .evaluate_cycle(self.provider.as_ref(), now)
            .await;

        if !actions.is_empty() {
            tracing::info!(
                creates = actions.create.len(),
                stops = actions.stop.len(),
                "Submitting actions"
            );
            if let Err(e) = self.runtime.execute(&actions).await {
                self.controller.reject_actions(&actions);
                return Err(e);
            }
        }

        Ok(actions)
    }

    /// Run cycles until `shutdown` flips to true or its sender is dropped
    ///
    /// Open positions are left to their barriers on shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.cycle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(cycle_secs = self.cycle.as_secs_f64(), "Engine started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle(Utc::now()).await {
                        tracing::error!("Cycle failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let open = self.controller.positions().open_positions();
        if !open.is_empty() {
            tracing::warn!(count = open.len(), "Shutting down with open positions, not closing them");
            for position in open {
                tracing::info!(
                    executor_id = %position.id,
                    market = %position.market,
                    side = %position.side,
                    status = %position.status,
                    "Open position left running"
                );
            }
        }

        tracing::info!("Engine stopped");
        Ok(())
    }
}
