// Core modules
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use crate::config::BotConfig;
pub use error::{ConfigError, EngineError, ExchangeError};
pub use exchange::ExchangePort;
pub use models::*;
pub use strategy::{SignalSource, StrategyKind};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
