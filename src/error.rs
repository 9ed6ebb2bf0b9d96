use std::time::Duration;
use thiserror::Error;

use crate::execution::order_sequencer::BracketState;

/// Errors returned by an exchange adapter
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("api error: status {status}, code {code}, message {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl ExchangeError {
    /// Authentication or permission failure (bad key, IP restriction)
    pub fn is_auth(&self) -> bool {
        match self {
            ExchangeError::Api { status, code, .. } => {
                *status == 401 || *status == 403 || matches!(code, -2014 | -2015)
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Decode(err.to_string())
    }
}

/// Engine-level errors, classified by how the loop reacts to them
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network, auth or rate-limit trouble. Retried on the next cycle.
    #[error("transient api error during {operation}: {source}")]
    TransientApi {
        operation: &'static str,
        #[source]
        source: ExchangeError,
    },

    /// The order cannot be computed for this symbol. Only this attempt is aborted.
    #[error("validation error for {symbol}: {reason}")]
    Validation { symbol: String, reason: String },

    /// Entry is live but a protective order is missing. Needs operator attention.
    #[error("degraded bracket for {symbol} ({state:?}): {source}")]
    DegradedBracket {
        symbol: String,
        state: BracketState,
        #[source]
        source: ExchangeError,
    },
}

impl EngineError {
    pub fn transient(operation: &'static str, source: ExchangeError) -> Self {
        EngineError::TransientApi { operation, source }
    }

    pub fn validation(symbol: &str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    /// No answer came back, so the venue may still have acted on the request
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            EngineError::TransientApi {
                source: ExchangeError::Timeout(_),
                ..
            }
        )
    }
}

/// Invalid configuration values
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
