use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use sigbot::config::AppConfig;
use sigbot::execution::{
    BarBuffer, Engine, ExecutorEvent, MarketDataProvider, NoopVenueSetup, PaperExecutor,
    PositionLifecycleController, PositionStatus,
};
use sigbot::risk::CloseType;
use sigbot::{Bar, BotError, Interval, MarketKey, PositionSide};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BREAKOUT_CONFIG: &str = r#"
[controller]
order_amount_quote = 25.0
leverage = 20
position_mode = "hedge"
interval = "1m"

[[markets]]
venue = "paper_perpetual"
pair = "BTC-USDT"

[strategy]
kind = "bollinger_breakout"
length = 10
std_dev = 2.0
"#;

fn write_config(dir: &Path, content: &str) {
    let mut file = std::fs::File::create(dir.join("default.toml")).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn btc() -> MarketKey {
    MarketKey::new("paper_perpetual", "BTC-USDT")
}

/// Quiet range, one bar above the upper band, then back inside
fn breakout_bars() -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut prices: Vec<f64> = (0..12)
        .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
        .collect();
    prices.extend([115.0, 100.0, 100.0]);

    prices
        .iter()
        .enumerate()
        .map(|(i, &price)| Bar {
            open_time: start + ChronoDuration::minutes(i as i64),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1_000.0,
        })
        .collect()
}

fn paper_engine(config: &AppConfig, buffer: &BarBuffer) -> Engine<PaperExecutor> {
    let provider: Arc<dyn MarketDataProvider> = Arc::new(buffer.clone());
    let controller = PositionLifecycleController::new(config, Utc::now()).unwrap();
    Engine::new(
        controller,
        provider.clone(),
        PaperExecutor::new(provider),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_breakout_short_lifecycle() {
    let _ = tracing_subscriber::fmt::try_init();

    println!("=== Breakout short lifecycle ===\n");

    // 1. Load configuration from a directory
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), BREAKOUT_CONFIG);
    let config = AppConfig::load_from(dir.path()).unwrap();
    assert!(config.override_signal.is_none());
    println!("1. ✓ Config loaded: {:?}", config.strategy);

    // 2. Feed bars and configure the venue
    let buffer = BarBuffer::new(100);
    let interval: Interval = "1m".parse().unwrap();
    for bar in breakout_bars() {
        buffer.add_bar(&btc(), interval, bar).unwrap();
    }

    let mut engine = paper_engine(&config, &buffer);
    assert!(engine.initialize(&NoopVenueSetup).await.is_empty());

    // 3. First cycle opens a short with the band-derived take profit
    let now = Utc::now();
    let actions = engine.run_cycle(now).await.unwrap();
    assert_eq!(actions.create.len(), 1);
    assert!(actions.stop.is_empty());

    let created = &actions.create[0].config;
    assert_eq!(created.side, PositionSide::Short);
    assert_eq!(created.entry_price, 100.0);
    assert!((created.amount - 5.0).abs() < 1e-12); // 25 * 20 / 100
    let take_profit = created.barrier.take_profit.unwrap();
    assert!(take_profit > 0.001);
    assert_ne!(take_profit, 0.03);
    assert_eq!(created.barrier.stop_loss, Some(0.02));
    println!("3. ✓ Short created, take profit {:.4}", take_profit);

    // 4. Fill is reported back; the repeated signal is deduplicated
    let actions = engine.run_cycle(now).await.unwrap();
    assert!(actions.is_empty());
    let position = engine.controller().positions().get_position(created.id).unwrap();
    assert_eq!(position.status, PositionStatus::Active);
    println!("4. ✓ Position active, no duplicate");

    // 5. Price drops past the take profit
    buffer
        .set_mid_price(&btc(), 100.0 * (1.0 - take_profit - 0.001))
        .unwrap();
    engine.run_cycle(now + ChronoDuration::seconds(10)).await.unwrap();

    let position = engine.controller().positions().get_position(created.id).unwrap();
    assert_eq!(position.status, PositionStatus::Closed);
    assert_eq!(position.close_type, Some(CloseType::TakeProfit));
    assert!(engine.runtime().realized_pnl() > 0.0);
    println!("5. ✓ Closed at take profit, pnl {:.4}", engine.runtime().realized_pnl());
}

#[tokio::test]
async fn test_override_reversal_stops_then_opens() {
    let dir = tempfile::tempdir().unwrap();
    let directive = dir.path().join("position");
    std::fs::write(&directive, "LONG\n").unwrap();

    let content = format!(
        r#"
[controller]
position_mode = "ONEWAY"

[[markets]]
venue = "paper_perpetual"
pair = "BTC-USDT"

[override_signal]
path = "{}"
"#,
        directive.display()
    );
    write_config(dir.path(), &content);
    let config = AppConfig::load_from(dir.path()).unwrap();
    assert!(config.strategy.is_none());

    let buffer = BarBuffer::new(10);
    buffer.set_mid_price(&btc(), 50_000.0).unwrap();

    let provider: Arc<dyn MarketDataProvider> = Arc::new(buffer.clone());
    let started = Utc::now() - ChronoDuration::hours(1);
    let controller = PositionLifecycleController::new(&config, started).unwrap();
    let mut engine = Engine::new(
        controller,
        provider.clone(),
        PaperExecutor::new(provider),
        Duration::from_secs(5),
    );

    // Cycle clock stays behind the directive's mtime so each write is fresh
    let cycle_time = started + ChronoDuration::minutes(1);

    let actions = engine.run_cycle(cycle_time).await.unwrap();
    assert_eq!(actions.create.len(), 1);
    assert!((actions.create[0].config.amount - 0.01).abs() < 1e-12);
    let long_id = actions.create[0].config.id;

    std::fs::write(&directive, "SHORT").unwrap();
    let actions = engine.run_cycle(cycle_time).await.unwrap();
    assert_eq!(actions.stop.len(), 1);
    assert_eq!(actions.stop[0].executor_id, long_id);
    assert_eq!(actions.create.len(), 1);
    assert_eq!(actions.create[0].config.side, PositionSide::Short);

    // Runtime confirms the early stop on the next poll
    engine.run_cycle(cycle_time).await.unwrap();
    let long = engine.controller().positions().get_position(long_id).unwrap();
    assert_eq!(long.status, PositionStatus::Closed);
    assert_eq!(long.close_type, Some(CloseType::EarlyStop));

    let (longs, shorts) = engine.controller().positions().active_by_side(&btc());
    assert!(longs.is_empty());
    assert_eq!(shorts.len(), 1);
}

#[tokio::test]
async fn test_lowercase_directive_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let directive = dir.path().join("position");
    std::fs::write(&directive, "long").unwrap();

    let content = format!(
        "[[markets]]\nvenue = \"paper_perpetual\"\npair = \"BTC-USDT\"\n\n[override_signal]\npath = \"{}\"\n",
        directive.display()
    );
    write_config(dir.path(), &content);
    let config = AppConfig::load_from(dir.path()).unwrap();

    let buffer = BarBuffer::new(10);
    buffer.set_mid_price(&btc(), 50_000.0).unwrap();
    let started = Utc::now() - ChronoDuration::hours(1);
    let mut controller = PositionLifecycleController::new(&config, started).unwrap();

    let actions = controller.evaluate_cycle(&buffer, started).await;
    assert!(actions.is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"
[controller]
leverage = 0
position_mode = "CROSS"

[[markets]]
venue = "paper_perpetual"
pair = "BTC-USDT"

[strategy]
kind = "moving_average_cross"
fast_length = 50
slow_length = 10
"#,
    );

    let err = AppConfig::load_from(dir.path()).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, BotError::InvalidConfiguration(_)));
    assert!(message.contains("leverage"));
    assert!(message.contains("CROSS"));
    assert!(message.contains("fast_length"));
}

#[test]
fn test_executor_event_serializes() {
    let event = ExecutorEvent::Closed {
        close_type: CloseType::TrailingStop,
        exit_price: 101.5,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("TrailingStop"));
}
