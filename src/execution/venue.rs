use async_trait::async_trait;

use crate::models::PositionMode;

/// Account setup on a perpetual venue
///
/// Errors are plain `anyhow` errors from the venue client; the controller
/// turns them into `BotError::VenueSetup` for that venue only.
#[async_trait]
pub trait VenueSetup: Send + Sync {
    async fn set_position_mode(&self, venue: &str, mode: PositionMode) -> anyhow::Result<()>;

    async fn set_leverage(&self, venue: &str, pair: &str, leverage: u32) -> anyhow::Result<()>;
}

/// Venue setup that accepts everything, for paper trading
#[derive(Debug, Clone, Default)]
pub struct NoopVenueSetup;

#[async_trait]
impl VenueSetup for NoopVenueSetup {
    async fn set_position_mode(&self, venue: &str, mode: PositionMode) -> anyhow::Result<()> {
        tracing::info!(venue, %mode, "Position mode set (paper)");
        Ok(())
    }

    async fn set_leverage(&self, venue: &str, pair: &str, leverage: u32) -> anyhow::Result<()> {
        tracing::info!(venue, pair, leverage, "Leverage set (paper)");
        Ok(())
    }
}
