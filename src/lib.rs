// Core modules
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod signal_override;
pub mod strategy;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{BotError, Result};
pub use models::*;
pub use strategy::SignalStrategy;
