use chrono::Utc;
use clap::{Parser, Subcommand};
use sigbot::config::{AppConfig, LoggingConfig};
use sigbot::execution::{
    BarBuffer, Engine, MarketDataProvider, NoopVenueSetup, PaperExecutor,
    PositionLifecycleController, SyntheticFeed,
};
use sigbot::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

/// Bars kept per series; covers the longest strategy lookback with room to spare
const BUFFER_BARS: usize = 1_000;

#[derive(Parser)]
#[command(name = "sigbot")]
#[command(about = "Signal-driven perpetual position controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller in paper mode against a synthetic feed
    Run {
        /// Config directory (default.toml plus $SIGBOT_ENV overrides)
        #[arg(short, long, default_value = "config")]
        config: String,
        /// Seed for the synthetic price feed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Load and validate configuration, then print it
    Check {
        #[arg(short, long, default_value = "config")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, seed } => {
            let config = AppConfig::load_from(&config)?;
            setup_logging(&config.logging);
            run_paper(config, seed).await
        }
        Commands::Check { config } => {
            let config = AppConfig::load_from(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sigbot={}", logging.level)));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn spawn_feed(mut feed: SyntheticFeed, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = feed.tick(Utc::now()) {
                tracing::error!("Synthetic feed tick failed: {}", e);
            }
        }
    })
}

// ============================================================================
// Paper Mode
// ============================================================================

async fn run_paper(config: AppConfig, seed: u64) -> Result<()> {
    tracing::info!("🚀 sigbot starting in paper mode");
    tracing::info!(
        markets = config.markets.len(),
        strategy = ?config.strategy,
        interval = %config.controller.interval,
        leverage = config.controller.leverage,
        order_amount_quote = config.controller.order_amount_quote,
        "📊 Configuration"
    );

    let started_at = Utc::now();
    let buffer = BarBuffer::new(BUFFER_BARS);

    let mut feed = SyntheticFeed::new(
        seed,
        &config.markets,
        config.controller.interval,
        config.runtime.base_price,
        buffer.clone(),
    );
    feed.prefill(BUFFER_BARS / 2, started_at)?;
    let feed_task = spawn_feed(feed, Duration::from_secs(config.runtime.feed_secs));

    let provider: Arc<dyn MarketDataProvider> = Arc::new(buffer);
    let controller = PositionLifecycleController::new(&config, started_at)?;
    let mut engine = Engine::new(
        controller,
        provider.clone(),
        PaperExecutor::new(provider),
        Duration::from_secs(config.runtime.cycle_secs),
    );

    for failure in engine.initialize(&NoopVenueSetup).await {
        tracing::error!("⚠️  {}", failure);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the sender alive so the engine is not stopped by the drop
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await?;
    feed_task.abort();

    tracing::info!(
        realized_pnl = engine.runtime().realized_pnl(),
        open = engine.runtime().open_count(),
        "👋 sigbot stopped"
    );
    Ok(())
}
