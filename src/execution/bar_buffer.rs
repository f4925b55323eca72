use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use super::MarketDataProvider;
use crate::error::{BotError, Result};
use crate::models::{Bar, Interval, MarketKey};

type SeriesKey = (MarketKey, Interval);

fn poisoned<E: std::fmt::Display>(e: E) -> BotError {
    BotError::Other(anyhow::anyhow!("bar buffer lock poisoned: {}", e))
}

/// Thread-safe in-memory buffer for bar data
///
/// Maintains a rolling window of bars per (venue, pair, interval) plus the
/// latest quote per market.
#[derive(Clone)]
pub struct BarBuffer {
    data: Arc<RwLock<HashMap<SeriesKey, VecDeque<Bar>>>>,
    quotes: Arc<RwLock<HashMap<MarketKey, f64>>>,
    max_bars: usize,
}

impl BarBuffer {
    /// Create a new bar buffer
    ///
    /// # Arguments
    /// * `max_bars` - Maximum number of bars to keep per series
    pub fn new(max_bars: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            quotes: Arc::new(RwLock::new(HashMap::new())),
            max_bars,
        }
    }

    /// Add a bar to a series
    ///
    /// A bar with the same open time as the newest one replaces it (the
    /// forming bar is updated in place). Older bars are rejected. Also sets
    /// the market quote to the bar's close.
    pub fn add_bar(&self, market: &MarketKey, interval: Interval, bar: Bar) -> Result<()> {
        let close = bar.close;

        {
            let mut data = self.data.write().map_err(poisoned)?;
            let series = data
                .entry((market.clone(), interval))
                .or_insert_with(VecDeque::new);

            match series.back().map(|b| b.open_time) {
                Some(newest) if newest == bar.open_time => {
                    series.pop_back();
                    series.push_back(bar);
                }
                Some(newest) if newest > bar.open_time => {
                    return Err(BotError::InvalidMarketData(format!(
                        "{} {}: bar at {} is older than newest bar at {}",
                        market, interval, bar.open_time, newest
                    )));
                }
                _ => series.push_back(bar),
            }

            // Remove oldest if exceeds max
            while series.len() > self.max_bars {
                series.pop_front();
            }
        }

        self.set_mid_price(market, close)
    }

    /// Set the current quote for a market
    pub fn set_mid_price(&self, market: &MarketKey, price: f64) -> Result<()> {
        let mut quotes = self.quotes.write().map_err(poisoned)?;
        quotes.insert(market.clone(), price);
        Ok(())
    }

    /// Get the N most recent bars of a series
    pub fn get_recent_bars(&self, market: &MarketKey, interval: Interval, n: usize) -> Result<Vec<Bar>> {
        let data = self.data.read().map_err(poisoned)?;

        Ok(data
            .get(&(market.clone(), interval))
            .map(|deque| {
                let skip = deque.len().saturating_sub(n);
                deque.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    /// Get count of bars in a series
    pub fn bar_count(&self, market: &MarketKey, interval: Interval) -> Result<usize> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(&(market.clone(), interval)).map(|d| d.len()).unwrap_or(0))
    }
}

#[async_trait]
impl MarketDataProvider for BarBuffer {
    async fn get_bars(
        &self,
        market: &MarketKey,
        interval: Interval,
        max_records: usize,
    ) -> Result<Vec<Bar>> {
        self.get_recent_bars(market, interval, max_records)
    }

    async fn mid_price(&self, market: &MarketKey) -> Result<f64> {
        let quotes = self.quotes.read().map_err(poisoned)?;
        quotes
            .get(market)
            .copied()
            .ok_or_else(|| BotError::MarketDataUnavailable(format!("no quote for {}", market)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn create_test_bar(minute: i64, price: f64) -> Bar {
        Bar {
            open_time: start() + Duration::minutes(minute),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1000.0,
        }
    }

    fn btc() -> MarketKey {
        MarketKey::new("binance_perpetual", "BTC-USDT")
    }

    fn one_minute() -> Interval {
        Interval::from_secs(60)
    }

    #[test]
    fn test_add_bar() {
        let buffer = BarBuffer::new(100);
        buffer.add_bar(&btc(), one_minute(), create_test_bar(0, 100.0)).unwrap();

        assert_eq!(buffer.bar_count(&btc(), one_minute()).unwrap(), 1);
        assert_eq!(buffer.bar_count(&btc(), Interval::from_secs(300)).unwrap(), 0);
    }

    #[test]
    fn test_forming_bar_is_replaced() {
        let buffer = BarBuffer::new(100);
        buffer.add_bar(&btc(), one_minute(), create_test_bar(0, 100.0)).unwrap();
        buffer.add_bar(&btc(), one_minute(), create_test_bar(1, 101.0)).unwrap();
        buffer.add_bar(&btc(), one_minute(), create_test_bar(1, 102.5)).unwrap();

        let bars = buffer.get_recent_bars(&btc(), one_minute(), 10).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 102.5);
    }

    #[test]
    fn test_older_bar_is_rejected() {
        let buffer = BarBuffer::new(100);
        buffer.add_bar(&btc(), one_minute(), create_test_bar(5, 100.0)).unwrap();

        let err = buffer
            .add_bar(&btc(), one_minute(), create_test_bar(4, 99.0))
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidMarketData(_)));
    }

    #[test]
    fn test_max_bars_limit() {
        let buffer = BarBuffer::new(5);

        for i in 0..10 {
            buffer
                .add_bar(&btc(), one_minute(), create_test_bar(i, 100.0 + i as f64))
                .unwrap();
        }

        let bars = buffer.get_recent_bars(&btc(), one_minute(), 100).unwrap();
        assert_eq!(bars.len(), 5);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[4].close, 109.0);
    }

    #[tokio::test]
    async fn test_provider_returns_most_recent_window() {
        let buffer = BarBuffer::new(100);
        for i in 0..10 {
            buffer
                .add_bar(&btc(), one_minute(), create_test_bar(i, 100.0 + i as f64))
                .unwrap();
        }

        let bars = buffer.get_bars(&btc(), one_minute(), 3).await.unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].close, 107.0);
        assert_eq!(bars[2].close, 109.0);

        assert_eq!(buffer.mid_price(&btc()).await.unwrap(), 109.0);
    }

    #[tokio::test]
    async fn test_missing_quote_is_unavailable() {
        let buffer = BarBuffer::new(100);
        let err = buffer.mid_price(&btc()).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_thread_safety() {
        use std::thread;

        let buffer = BarBuffer::new(100);
        let buffer_clone = buffer.clone();
        let eth = MarketKey::new("binance_perpetual", "ETH-USDT");
        let eth_clone = eth.clone();

        let handle = thread::spawn(move || {
            for i in 0..50 {
                buffer_clone
                    .add_bar(&eth_clone, one_minute(), create_test_bar(i, 100.0))
                    .unwrap();
            }
        });

        for i in 0..50 {
            buffer.add_bar(&btc(), one_minute(), create_test_bar(i, 100.0)).unwrap();
        }

        handle.join().unwrap();

        assert_eq!(buffer.bar_count(&btc(), one_minute()).unwrap(), 50);
        assert_eq!(buffer.bar_count(&eth, one_minute()).unwrap(), 50);
    }
}
