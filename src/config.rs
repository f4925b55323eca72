use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{BotError, Result};
use crate::models::{Interval, MarketKey, PositionMode};
use crate::risk::RiskConfig;
use crate::signal_override::OverrideConfig;
use crate::strategy::StrategyConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
    /// Signal strategy; without one the controller only follows the override file
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub override_signal: Option<OverrideConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Quote amount committed per position before leverage
    pub order_amount_quote: f64,
    pub leverage: u32,
    /// HEDGE or ONEWAY
    pub position_mode: String,
    /// Candle interval fed to the strategy
    pub interval: Interval,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            order_amount_quote: 25.0,
            leverage: 20,
            position_mode: "HEDGE".to_string(),
            interval: Interval::default(),
        }
    }
}

impl ControllerConfig {
    pub fn position_mode(&self) -> Result<PositionMode> {
        self.position_mode.parse()
    }
}

/// A traded (venue, pair) and where its candles come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub venue: String,
    pub pair: String,
    /// Candle source venue; defaults to `venue`
    #[serde(default)]
    pub candles_venue: Option<String>,
    /// Candle source pair; defaults to `pair`
    #[serde(default)]
    pub candles_pair: Option<String>,
    /// Perpetual venues get position mode and leverage applied at startup
    #[serde(default = "default_perpetual")]
    pub perpetual: bool,
}

fn default_perpetual() -> bool {
    true
}

impl MarketConfig {
    pub fn key(&self) -> MarketKey {
        MarketKey::new(&self.venue, &self.pair)
    }

    pub fn candles_key(&self) -> MarketKey {
        MarketKey::new(
            self.candles_venue.as_deref().unwrap_or(&self.venue),
            self.candles_pair.as_deref().unwrap_or(&self.pair),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seconds between evaluation cycles
    pub cycle_secs: u64,
    /// Seconds between synthetic price updates in paper mode
    pub feed_secs: u64,
    /// Starting price of the synthetic feed
    pub base_price: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cycle_secs: 5,
            feed_secs: 1,
            base_price: 50_000.0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            markets: vec![MarketConfig {
                venue: "paper_perpetual".to_string(),
                pair: "BTC-USDT".to_string(),
                candles_venue: None,
                candles_pair: None,
                perpetual: true,
            }],
            strategy: Some(StrategyConfig::MovingAverageCross {
                fast_length: 1,
                slow_length: 50,
            }),
            risk: RiskConfig::default(),
            override_signal: None,
            logging: LoggingConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default directory
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SIGBOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SIGBOT_CONTROLLER__LEVERAGE, etc.)
            .add_source(
                Environment::with_prefix("SIGBOT")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration; every problem is reported at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.markets.is_empty() {
            errors.push("at least one market must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for market in &self.markets {
            if market.venue.is_empty() || market.pair.is_empty() {
                errors.push("market venue and pair must not be empty".to_string());
            }
            if !seen.insert(market.key()) {
                errors.push(format!("duplicate market {}", market.key()));
            }
        }

        if !(self.controller.order_amount_quote > 0.0) {
            errors.push(format!(
                "order_amount_quote must be positive, got {}",
                self.controller.order_amount_quote
            ));
        }

        if self.controller.leverage == 0 {
            errors.push("leverage must be positive".to_string());
        }

        if let Err(e) = self.controller.position_mode() {
            errors.push(e.to_string());
        }

        if let Some(strategy) = &self.strategy {
            if let Err(e) = strategy.validate() {
                errors.push(e.to_string());
            }
        } else if self.override_signal.is_none() {
            errors.push("either a strategy or an override_signal source is required".to_string());
        }

        if let Err(e) = self.risk.validate() {
            errors.push(e.to_string());
        }

        if self.runtime.cycle_secs == 0 || self.runtime.feed_secs == 0 {
            errors.push("runtime cycle_secs and feed_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BotError::InvalidConfiguration(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unknown_position_mode_is_rejected() {
        let mut config = AppConfig::default();
        config.controller.position_mode = "CROSS".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, BotError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("CROSS"));
    }

    #[test]
    fn test_reports_all_problems() {
        let mut config = AppConfig::default();
        config.markets.clear();
        config.controller.leverage = 0;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("at least one market"));
        assert!(message.contains("leverage"));
    }

    #[test]
    fn test_needs_strategy_or_override() {
        let mut config = AppConfig::default();
        config.strategy = None;
        assert!(config.validate().is_err());

        config.override_signal = Some(OverrideConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_candles_key_defaults_to_market() {
        let market = MarketConfig {
            venue: "hyperliquid_perpetual".to_string(),
            pair: "BTC-USD".to_string(),
            candles_venue: Some("binance".to_string()),
            candles_pair: None,
            perpetual: true,
        };

        assert_eq!(market.candles_key(), MarketKey::new("binance", "BTC-USD"));
        assert_eq!(market.key(), MarketKey::new("hyperliquid_perpetual", "BTC-USD"));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
[controller]
order_amount_quote = 30.0
leverage = 5
position_mode = "oneway"
interval = "5m"

[[markets]]
venue = "binance_perpetual"
pair = "ETH-USDT"

[strategy]
kind = "bollinger_breakout"
length = 30

[risk]
stop_loss = 0.01
"#
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.controller.leverage, 5);
        assert_eq!(config.controller.position_mode().unwrap(), PositionMode::OneWay);
        assert_eq!(config.controller.interval.as_secs(), 300);
        assert_eq!(config.markets.len(), 1);
        assert!(config.markets[0].perpetual);
        assert_eq!(config.risk.stop_loss, Some(0.01));
        assert!(matches!(
            config.strategy,
            Some(StrategyConfig::BollingerBreakout { length: 30, .. })
        ));
    }
}
