use thiserror::Error;

/// Error type shared by the signal, barrier and lifecycle layers
#[derive(Error, Debug)]
pub enum BotError {
    // Recoverable: the cycle for this market is skipped and retried next tick
    #[error("Insufficient data: {have} bars, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Fatal at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Fatal for one venue only
    #[error("Venue setup failed for {venue}: {reason}")]
    VenueSetup { venue: String, reason: String },

    #[error("Invalid position transition: from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Already have an active {side} position on {market}")]
    DuplicatePosition { market: String, side: String },

    #[error("Unknown executor: {0}")]
    UnknownExecutor(uuid::Uuid),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BotError {
    /// Errors after which the next evaluation cycle may simply retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BotError::InsufficientData { .. } | BotError::MarketDataUnavailable(_)
        )
    }
}

/// Result type alias for BotError
pub type Result<T> = std::result::Result<T, BotError>;
