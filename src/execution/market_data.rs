use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Bar, Interval, MarketKey};

/// Source of bar windows and reference prices
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// The most recent `max_records` bars, oldest first
    ///
    /// May return fewer bars than requested while history is still filling.
    async fn get_bars(
        &self,
        market: &MarketKey,
        interval: Interval,
        max_records: usize,
    ) -> Result<Vec<Bar>>;

    /// Current mid price used for sizing new positions
    async fn mid_price(&self, market: &MarketKey) -> Result<f64>;
}
