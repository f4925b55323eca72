use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use super::BarBuffer;
use crate::config::MarketConfig;
use crate::error::{BotError, Result};
use crate::models::{Bar, Interval, MarketKey};

/// Per-step relative noise of the random walk
const STEP_NOISE: f64 = 0.001;

struct FeedSeries {
    price: f64,
    forming: Option<Bar>,
    /// Traded markets quoted off this series
    quoted: Vec<MarketKey>,
}

/// Seeded random-walk price source for paper trading
///
/// Writes bars for every candle source into a `BarBuffer` and quotes the
/// traded markets off the same price. The same seed reproduces the same walk.
pub struct SyntheticFeed {
    rng: StdRng,
    interval: Interval,
    buffer: BarBuffer,
    series: HashMap<MarketKey, FeedSeries>,
    base_volume: f64,
}

impl SyntheticFeed {
    pub fn new(
        seed: u64,
        markets: &[MarketConfig],
        interval: Interval,
        base_price: f64,
        buffer: BarBuffer,
    ) -> Self {
        let mut series: HashMap<MarketKey, FeedSeries> = HashMap::new();
        for market in markets {
            series
                .entry(market.candles_key())
                .or_insert_with(|| FeedSeries {
                    price: base_price,
                    forming: None,
                    quoted: Vec::new(),
                })
                .quoted
                .push(market.key());
        }

        Self {
            rng: StdRng::seed_from_u64(seed),
            interval,
            buffer,
            series,
            base_volume: 1_000.0,
        }
    }

    pub fn buffer(&self) -> &BarBuffer {
        &self.buffer
    }

    /// Fill `bars` closed bars of history ending before `now`
    pub fn prefill(&mut self, bars: usize, now: DateTime<Utc>) -> Result<()> {
        let current = bucket_start(now, self.interval)?;

        for i in (1..=bars).rev() {
            let open_time = current - self.interval.as_duration() * i as i32;
            self.step_all(open_time)?;
        }

        Ok(())
    }

    /// Advance every series one step
    ///
    /// Updates the forming bar of the interval containing `now`, or starts a
    /// new one when the interval rolled over.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let open_time = bucket_start(now, self.interval)?;
        self.step_all(open_time)
    }

    fn step_all(&mut self, open_time: DateTime<Utc>) -> Result<()> {
        let mut keys: Vec<MarketKey> = self.series.keys().cloned().collect();
        keys.sort();

        for key in keys {
            let noise = self.rng.gen_range(-STEP_NOISE..STEP_NOISE);
            let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

            let Some(series) = self.series.get_mut(&key) else {
                continue;
            };
            series.price *= 1.0 + noise;
            let price = series.price;

            let bar = match series.forming.take() {
                Some(mut bar) if bar.open_time == open_time => {
                    bar.high = bar.high.max(price);
                    bar.low = bar.low.min(price);
                    bar.close = price;
                    bar.volume += volume;
                    bar
                }
                previous => {
                    let open = previous.map(|b| b.close).unwrap_or(price);
                    Bar {
                        open_time,
                        open,
                        high: open.max(price),
                        low: open.min(price),
                        close: price,
                        volume,
                    }
                }
            };

            series.forming = Some(bar.clone());
            self.buffer.add_bar(&key, self.interval, bar)?;
            for market in &series.quoted {
                self.buffer.set_mid_price(market, price)?;
            }
        }

        Ok(())
    }
}

/// Start of the interval bucket containing `time`
fn bucket_start(time: DateTime<Utc>, interval: Interval) -> Result<DateTime<Utc>> {
    let secs = interval.as_secs() as i64;
    let ts = time.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(secs), 0)
        .ok_or_else(|| BotError::InvalidMarketData(format!("timestamp out of range: {}", ts)))
}
