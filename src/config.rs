use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::exchange::binance::{BinanceConfig, BINANCE_FUTURES_API};
use crate::execution::{BracketParams, LoopSettings};
use crate::models::{CandleInterval, MarginMode};
use crate::risk::PositionCap;
use crate::strategy::StrategyKind;

/// Prefix for environment overrides, e.g. `FUTURESBOT_LEVERAGE=5`
pub const ENV_PREFIX: &str = "FUTURESBOT";

/// Bot configuration
///
/// Sources, lowest priority first: built-in defaults, an optional TOML file,
/// then `FUTURESBOT_*` environment variables. API credentials are read from
/// `BINANCE_API_KEY` / `BINANCE_API_SECRET` separately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    // Bracket
    pub take_profit_fraction: f64,
    pub stop_loss_fraction: f64,
    /// Quote-asset value of each entry
    pub fixed_notional_volume: f64,
    pub settle_delay_ms: u64,

    // Account
    pub leverage: u32,
    pub margin_mode: MarginMode,
    pub max_concurrent_positions: usize,

    // Scanning
    pub strategy: StrategyKind,
    pub quote_asset: String,
    pub excluded_symbols: Vec<String>,
    pub candle_interval: CandleInterval,
    pub candle_limit: u32,
    pub cycle_interval_secs: u64,
    pub post_trade_cooldown_secs: u64,

    // Venue
    pub base_url: String,
    pub recv_window_ms: u64,
    pub requests_per_minute: u32,
    pub request_timeout_secs: u64,

    /// Bracket journal; disabled when unset
    pub redis_url: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            take_profit_fraction: 0.012,
            stop_loss_fraction: 0.009,
            fixed_notional_volume: 10.0,
            settle_delay_ms: 2000,
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            max_concurrent_positions: 100,
            strategy: StrategyKind::RsiCrossover,
            quote_asset: "USDT".to_string(),
            excluded_symbols: vec!["USDCUSDT".to_string()],
            candle_interval: CandleInterval::FifteenMinutes,
            candle_limit: 500,
            cycle_interval_secs: 180,
            post_trade_cooldown_secs: 10,
            base_url: BINANCE_FUTURES_API.to_string(),
            recv_window_ms: 6000,
            requests_per_minute: 1200,
            request_timeout_secs: 10,
            redis_url: None,
        }
    }
}

impl BotConfig {
    /// Load and validate configuration
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("excluded_symbols"),
            )
            .build()?;

        let config: BotConfig = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the engine cannot trade with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = |field: &'static str, value: f64| {
            if value > 0.0 && value < 1.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is not between 0 and 1", value),
                })
            }
        };

        fraction("take_profit_fraction", self.take_profit_fraction)?;
        fraction("stop_loss_fraction", self.stop_loss_fraction)?;

        if !(self.fixed_notional_volume.is_finite() && self.fixed_notional_volume > 0.0) {
            return Err(ConfigError::Invalid {
                field: "fixed_notional_volume",
                reason: format!("{} must be positive", self.fixed_notional_volume),
            });
        }

        if self.leverage == 0 || self.leverage > 125 {
            return Err(ConfigError::Invalid {
                field: "leverage",
                reason: format!("{} is outside 1..=125", self.leverage),
            });
        }

        if self.max_concurrent_positions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_positions",
                reason: "must allow at least one position".to_string(),
            });
        }

        if self.quote_asset.is_empty() {
            return Err(ConfigError::Invalid {
                field: "quote_asset",
                reason: "must not be empty".to_string(),
            });
        }

        let required = self.strategy.build().min_candles_required();
        // One extra candle covers the still-forming bar that gets dropped
        if (self.candle_limit as usize) < required + 1 {
            return Err(ConfigError::Invalid {
                field: "candle_limit",
                reason: format!(
                    "{} candles is too few for {} (needs {})",
                    self.candle_limit,
                    self.strategy,
                    required + 1
                ),
            });
        }

        if self.requests_per_minute == 0 {
            return Err(ConfigError::Invalid {
                field: "requests_per_minute",
                reason: "must be positive".to_string(),
            });
        }

        Ok(())
    }

    pub fn bracket_params(&self) -> BracketParams {
        BracketParams {
            notional: self.fixed_notional_volume,
            stop_loss_fraction: self.stop_loss_fraction,
            take_profit_fraction: self.take_profit_fraction,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            quote_asset: self.quote_asset.clone(),
            candle_interval: self.candle_interval,
            candle_limit: self.candle_limit,
            leverage: self.leverage,
            margin_mode: self.margin_mode,
            excluded_symbols: self.excluded_symbols.iter().cloned().collect::<HashSet<_>>(),
            cycle_interval: Duration::from_secs(self.cycle_interval_secs),
            post_trade_cooldown: Duration::from_secs(self.post_trade_cooldown_secs),
        }
    }

    pub fn position_cap(&self) -> PositionCap {
        PositionCap::new(self.max_concurrent_positions)
    }

    pub fn binance_config(&self, api_key: String, api_secret: String) -> BinanceConfig {
        BinanceConfig {
            base_url: self.base_url.clone(),
            api_key,
            api_secret,
            recv_window_ms: self.recv_window_ms,
            requests_per_minute: self.requests_per_minute,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            quote_asset: self.quote_asset.clone(),
        }
    }
}

/// Read `BINANCE_API_KEY` and `BINANCE_API_SECRET`
pub fn credentials_from_env() -> Result<(String, String), ConfigError> {
    let read = |field: &'static str| {
        std::env::var(field)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid {
                field,
                reason: "not set in environment".to_string(),
            })
    };

    Ok((read("BINANCE_API_KEY")?, read("BINANCE_API_SECRET")?))
}
