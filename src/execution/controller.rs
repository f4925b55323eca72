use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::actions::{CreateExecutorAction, CycleActions, ExecutorConfig, ExecutorUpdate, StopExecutorAction};
use super::position_manager::{Position, PositionManager};
use super::{MarketDataProvider, VenueSetup};
use crate::config::{AppConfig, ControllerConfig, MarketConfig};
use crate::error::{BotError, Result};
use crate::models::{MarketKey, PositionMode, PositionSide, Signal, SignalReading};
use crate::risk::{build_barrier, RiskConfig, TakeProfitSource};
use crate::signal_override::FileOverrideSource;
use crate::strategy::signals::validate_bar_cadence;
use crate::strategy::SignalStrategy;

/// Where a cycle's signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Strategy,
    Override,
}

/// Base amount for a quote notional at a reference price
///
/// Returns `None` when the price cannot produce a positive size.
pub fn position_size(order_amount_quote: f64, leverage: u32, reference_price: f64) -> Option<f64> {
    if !(reference_price > 0.0) || !reference_price.is_finite() {
        return None;
    }

    let size = (order_amount_quote * leverage as f64) / reference_price;
    (size > 0.0 && size.is_finite()).then_some(size)
}

/// Mutable state carried between cycles
#[derive(Debug, Default)]
struct ControllerState {
    /// Last create action per market; override directives older than this are stale
    last_action: HashMap<MarketKey, DateTime<Utc>>,
    /// Venues whose position mode and leverage have been applied
    configured_venues: HashSet<String>,
    /// Venues whose setup failed; their markets are not evaluated
    disabled_venues: HashSet<String>,
}

/// Turns signals into create/stop actions for a set of markets
///
/// Owns the positions it creates and never touches any other. Each market
/// holds at most one pending or active position per side.
pub struct PositionLifecycleController {
    settings: ControllerConfig,
    position_mode: PositionMode,
    markets: Vec<MarketConfig>,
    risk: RiskConfig,
    strategy: Option<Box<dyn SignalStrategy>>,
    override_source: Option<FileOverrideSource>,
    override_takes_precedence: bool,
    positions: PositionManager,
    state: ControllerState,
}

impl PositionLifecycleController {
    /// Build a controller from validated configuration
    ///
    /// `started_at` seeds the last action time of every market, so override
    /// directives written before startup are ignored.
    pub fn new(config: &AppConfig, started_at: DateTime<Utc>) -> Result<Self> {
        config.validate()?;

        let strategy = config.strategy.as_ref().map(|s| s.build()).transpose()?;
        let (override_source, override_takes_precedence) = match &config.override_signal {
            Some(o) => (Some(FileOverrideSource::new(&o.path)), o.take_precedence),
            None => (None, false),
        };

        tracing::info!(
            strategy = strategy.as_ref().map(|s| s.name()).unwrap_or("override only"),
            markets = config.markets.len(),
            "Controller created"
        );

        let state = ControllerState {
            last_action: config.markets.iter().map(|m| (m.key(), started_at)).collect(),
            ..ControllerState::default()
        };

        Ok(Self {
            settings: config.controller.clone(),
            position_mode: config.controller.position_mode()?,
            markets: config.markets.clone(),
            risk: config.risk.clone(),
            strategy,
            override_source,
            override_takes_precedence,
            positions: PositionManager::new(),
            state,
        })
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn last_action_timestamp(&self, market: &MarketKey) -> Option<DateTime<Utc>> {
        self.state.last_action.get(market).copied()
    }

    pub fn is_venue_enabled(&self, venue: &str) -> bool {
        !self.state.disabled_venues.contains(venue)
    }

    /// Apply position mode and leverage once per perpetual venue
    ///
    /// A failing venue is disabled and its error returned; the others carry on.
    pub async fn apply_initial_settings(&mut self, setup: &dyn VenueSetup) -> Vec<BotError> {
        let mut venues: Vec<String> = Vec::new();
        for market in self.markets.iter().filter(|m| m.perpetual) {
            if !venues.contains(&market.venue) {
                venues.push(market.venue.clone());
            }
        }

        let mut failures = Vec::new();
        for venue in venues {
            if self.state.configured_venues.contains(&venue) {
                continue;
            }

            match self.configure_venue(setup, &venue).await {
                Ok(()) => {
                    tracing::info!(
                        venue = %venue,
                        mode = %self.position_mode,
                        leverage = self.settings.leverage,
                        "Venue configured"
                    );
                    self.state.configured_venues.insert(venue);
                }
                Err(e) => {
                    tracing::error!(venue = %venue, "Venue setup failed, disabling its markets: {}", e);
                    self.state.disabled_venues.insert(venue);
                    failures.push(e);
                }
            }
        }

        failures
    }

    async fn configure_venue(&self, setup: &dyn VenueSetup, venue: &str) -> Result<()> {
        let to_error = |e: anyhow::Error| BotError::VenueSetup {
            venue: venue.to_string(),
            reason: e.to_string(),
        };

        setup
            .set_position_mode(venue, self.position_mode)
            .await
            .map_err(to_error)?;

        for market in self.markets.iter().filter(|m| m.venue == venue) {
            setup
                .set_leverage(venue, &market.pair, self.settings.leverage)
                .await
                .map_err(to_error)?;
        }

        Ok(())
    }

    /// Apply status changes reported by the executor runtime
    pub fn apply_updates(&mut self, updates: &[ExecutorUpdate]) {
        for update in updates {
            if let Err(e) = self.positions.apply_update(update) {
                tracing::warn!(executor_id = %update.executor_id, "Ignoring executor update: {}", e);
            }
        }
    }

    /// Roll back the bookkeeping of actions the runtime did not accept
    ///
    /// Created positions are closed without a close type and stopped ones
    /// return to their previous status. `last_action` is left as is.
    pub fn reject_actions(&mut self, actions: &CycleActions) {
        for action in &actions.create {
            if let Err(e) = self.positions.abandon(action.config.id) {
                tracing::warn!(executor_id = %action.config.id, "Cannot abandon position: {}", e);
            }
        }
        for action in &actions.stop {
            if let Err(e) = self.positions.revert_closing(action.executor_id) {
                tracing::warn!(executor_id = %action.executor_id, "Cannot revert stop: {}", e);
            }
        }
    }

    /// Run one evaluation cycle over every enabled market
    ///
    /// Markets whose data is not ready yet are skipped without changing state.
    pub async fn evaluate_cycle(
        &mut self,
        provider: &dyn MarketDataProvider,
        now: DateTime<Utc>,
    ) -> CycleActions {
        let mut actions = CycleActions::default();

        for market in self.markets.clone() {
            if !self.is_venue_enabled(&market.venue) {
                continue;
            }

            match self.evaluate_market(&market, provider, now).await {
                Ok(market_actions) => actions.extend(market_actions),
                Err(e) if e.is_recoverable() => {
                    tracing::debug!(market = %market.key(), "Skipping cycle: {}", e);
                }
                Err(e) => {
                    tracing::warn!(market = %market.key(), "Cycle failed: {}", e);
                }
            }
        }

        actions
    }

    async fn evaluate_market(
        &mut self,
        market: &MarketConfig,
        provider: &dyn MarketDataProvider,
        now: DateTime<Utc>,
    ) -> Result<CycleActions> {
        let key = market.key();
        let reading = self.strategy_reading(market, provider, now).await?;
        let (signal, source) = self.resolve_signal(&key, reading.signal).await;

        let mut actions = CycleActions::default();
        let Some(side) = signal.side() else {
            return Ok(actions);
        };

        let (longs, shorts) = self.positions.active_by_side(&key);
        let (same_side, opposite_side): (Vec<Uuid>, Vec<Uuid>) = match side {
            PositionSide::Long => (ids(&longs), ids(&shorts)),
            PositionSide::Short => (ids(&shorts), ids(&longs)),
        };

        tracing::info!(
            market = %key,
            %signal,
            ?source,
            active_longs = longs.len(),
            active_shorts = shorts.len(),
            "Signal"
        );

        // Stop rule: an opposing signal closes the other side
        for id in opposite_side {
            if let Err(e) = self.positions.mark_closing(id) {
                tracing::warn!(market = %key, executor_id = %id, "Not stopping position: {}", e);
                continue;
            }
            tracing::info!(market = %key, executor_id = %id, "Stopping {} position", side.opposite());
            actions.stop.push(StopExecutorAction {
                executor_id: id,
                market: key.clone(),
            });
        }

        // Create rule: at most one pending/active position per side
        if !same_side.is_empty() {
            tracing::debug!(market = %key, "Already have an active {} position", side);
            return Ok(actions);
        }

        // From here on a failure skips the create but keeps the stops already emitted
        let reference_price = match provider.mid_price(&key).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(market = %key, "No reference price, skipping create: {}", e);
                return Ok(actions);
            }
        };
        let Some(amount) = position_size(
            self.settings.order_amount_quote,
            self.settings.leverage,
            reference_price,
        ) else {
            tracing::warn!(market = %key, reference_price, "Cannot size position, skipping create");
            return Ok(actions);
        };

        let take_profit_source = match source {
            SignalSource::Strategy => self
                .strategy
                .as_ref()
                .map(|s| s.take_profit_source())
                .unwrap_or(TakeProfitSource::Static),
            SignalSource::Override => TakeProfitSource::Static,
        };
        let barrier = build_barrier(&self.risk, &reading.metrics, take_profit_source);

        let config = ExecutorConfig {
            id: Uuid::new_v4(),
            timestamp: now,
            market: key.clone(),
            side,
            entry_price: reference_price,
            amount,
            leverage: self.settings.leverage,
            barrier,
        };

        if let Err(e) = self.positions.open_pending(&config) {
            tracing::warn!(market = %key, "Skipping create: {}", e);
            return Ok(actions);
        }
        self.state.last_action.insert(key.clone(), now);

        tracing::info!(
            market = %key,
            executor_id = %config.id,
            %side,
            entry_price = reference_price,
            amount,
            take_profit = ?config.barrier.take_profit,
            "Creating position"
        );

        actions.create.push(CreateExecutorAction { config });
        Ok(actions)
    }

    async fn strategy_reading(
        &self,
        market: &MarketConfig,
        provider: &dyn MarketDataProvider,
        now: DateTime<Utc>,
    ) -> Result<SignalReading> {
        let Some(strategy) = &self.strategy else {
            return Ok(SignalReading::flat(now));
        };

        let bars = provider
            .get_bars(
                &market.candles_key(),
                self.settings.interval,
                strategy.required_lookback(),
            )
            .await?;

        if let Err(e) = validate_bar_cadence(&bars, self.settings.interval.as_secs()) {
            tracing::warn!(market = %market.key(), "Irregular bars: {}", e);
        }

        strategy.compute(&bars)
    }

    /// Merge the strategy signal with the override directive
    async fn resolve_signal(&self, market: &MarketKey, strategy_signal: Signal) -> (Signal, SignalSource) {
        let Some(source) = &self.override_source else {
            return (strategy_signal, SignalSource::Strategy);
        };

        if !self.override_takes_precedence && strategy_signal != Signal::Flat {
            return (strategy_signal, SignalSource::Strategy);
        }

        match source.read(self.last_action_timestamp(market)).await {
            Ok(directive) if !directive.is_none() => (directive.signal(), SignalSource::Override),
            Ok(_) => (strategy_signal, SignalSource::Strategy),
            Err(e) => {
                tracing::warn!(path = %source.path().display(), "Failed to read override: {}", e);
                (strategy_signal, SignalSource::Strategy)
            }
        }
    }
}

fn ids(positions: &[&Position]) -> Vec<Uuid> {
    positions.iter().map(|p| p.id).collect()
}
