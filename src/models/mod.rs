use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A candle is closed once its whole interval lies in the past
    pub fn is_closed_at(&self, now: DateTime<Utc>, interval: CandleInterval) -> bool {
        self.open_time + interval.duration() <= now
    }
}

/// Kline interval accepted by the venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CandleInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
}

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "1m",
            CandleInterval::FiveMinutes => "5m",
            CandleInterval::FifteenMinutes => "15m",
            CandleInterval::OneHour => "1h",
            CandleInterval::FourHours => "4h",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            CandleInterval::OneMinute => Duration::minutes(1),
            CandleInterval::FiveMinutes => Duration::minutes(5),
            CandleInterval::FifteenMinutes => Duration::minutes(15),
            CandleInterval::OneHour => Duration::hours(1),
            CandleInterval::FourHours => Duration::hours(4),
        }
    }
}

impl Default for CandleInterval {
    fn default() -> Self {
        CandleInterval::FifteenMinutes
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Up,
    Down,
    None,
}

impl Signal {
    /// Direction to enter for this signal, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::Up => Some(Side::Long),
            Signal::Down => Some(Side::Short),
            Signal::None => None,
        }
    }
}

/// Direction of an entry. Protective orders go on the opposite side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Venue order side
    pub fn as_order_side(&self) -> &'static str {
        match self {
            Side::Long => "BUY",
            Side::Short => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Collateral allocation per position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
}

impl MarginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginMode::Isolated => "ISOLATED",
            MarginMode::Cross => "CROSSED",
        }
    }
}

/// Open position as reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub signed_quantity: f64, // negative = short
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.signed_quantity != 0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderType {
    Limit,
    StopMarket,
    TakeProfitMarket,
    Other,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderType::Other => "OTHER",
        }
    }
}

/// Resting order as reported by the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: String,
    pub order_type: OrderType,
    pub side: Side,
    pub price: Option<f64>,      // limit price
    pub stop_price: Option<f64>, // trigger price for stop/target
}

/// Request for a single order. Prices and quantity are already rounded.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: f64, // limit price for LIMIT, trigger price otherwise
    pub qty_precision: u32,
    pub price_precision: u32,
    pub client_order_id: Option<String>,
}

/// Decimal places the venue accepts for a symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolPrecision {
    pub price: u32,
    pub quantity: u32,
}

/// Round to `decimals` places, ties to even.
///
/// Works on the exact binary value of `value`, so `2.675` (stored just below
/// the midpoint) rounds down to `2.67`. Returns `None` for NaN or infinite input.
pub fn round_to_precision(value: f64, decimals: u32) -> Option<f64> {
    Decimal::from_f64_retain(value)?
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointNearestEven)
        .to_f64()
}

/// Format a value with exactly `decimals` places for the venue
pub fn format_with_precision(value: f64, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, value)
}
