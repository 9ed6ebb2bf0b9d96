// Exchange connectivity: the port the engine talks to and the venue adapter
pub mod binance;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::models::{CandleInterval, Candle, MarginMode, OpenOrder, OrderRequest, Position};

pub use binance::{BinanceConfig, BinanceFuturesClient};

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Everything the trading engine needs from a futures venue
///
/// Every call is awaited in sequence by the trading loop. Adapters are expected
/// to apply their own rate limiting and request timeouts.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Wallet balance of `asset` (e.g. "USDT")
    async fn get_balance(&self, asset: &str) -> ExchangeResult<f64>;

    /// Tradable symbols in a stable venue order
    async fn list_symbols(&self) -> ExchangeResult<Vec<String>>;

    /// Last traded price
    async fn get_price(&self, symbol: &str) -> ExchangeResult<f64>;

    /// Most recent `limit` candles, oldest first
    async fn get_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>>;

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()>;

    async fn set_leverage(&self, symbol: &str, level: u32) -> ExchangeResult<()>;

    async fn get_price_precision(&self, symbol: &str) -> ExchangeResult<u32>;

    async fn get_qty_precision(&self, symbol: &str) -> ExchangeResult<u32>;

    /// Place a single order and return the venue order id
    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<String>;

    /// Positions with non-zero quantity
    async fn get_open_positions(&self) -> ExchangeResult<Vec<Position>>;

    async fn get_open_orders(&self) -> ExchangeResult<Vec<OpenOrder>>;

    /// Cancel every resting order for `symbol`
    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()>;
}
