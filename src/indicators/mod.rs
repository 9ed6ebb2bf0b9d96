// Technical indicators module
// Implements RSI, EMA/SMA, MACD and StochRSI over closing-price series

pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stoch_rsi;

pub use macd::{macd_histogram_series, macd_warmup};
pub use moving_average::{calculate_ema, ema_series, sma_series};
pub use rsi::{calculate_rsi, rsi_series};
pub use stoch_rsi::{stoch_rsi_series, StochRsiParams};
