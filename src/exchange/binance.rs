use anyhow::Context;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{ExchangePort, ExchangeResult};
use crate::error::ExchangeError;
use crate::models::{
    format_with_precision, Candle, CandleInterval, MarginMode, OpenOrder, OrderRequest, OrderType,
    Position, Side, SymbolPrecision,
};

// USDⓈ-M futures REST API
// Docs: https://developers.binance.com/docs/derivatives/usds-margined-futures
pub const BINANCE_FUTURES_API: &str = "https://fapi.binance.com";

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection settings for the futures API
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub requests_per_minute: u32,
    pub request_timeout: Duration,
    /// Only symbols containing this asset are traded
    pub quote_asset: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_FUTURES_API.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: 6000,
            requests_per_minute: 1200,
            request_timeout: Duration::from_secs(10),
            quote_asset: "USDT".to_string(),
        }
    }
}

/// Binance USDⓈ-M futures client with rate limiting and a precision cache
///
/// This struct is cloneable to allow sharing across async tasks.
/// All clones share the same rate limiter and precision cache.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    config: BinanceConfig,
    precisions: Arc<RwLock<HashMap<String, SymbolPrecision>>>,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    price_precision: u32,
    quantity_precision: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderEntry {
    symbol: String,
    order_id: i64,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    price: String,
    stop_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    order_id: i64,
}

fn parse_f64(field: &str, value: &str) -> ExchangeResult<f64> {
    value
        .parse::<f64>()
        .map_err(|_| ExchangeError::Decode(format!("{} is not a number: {:?}", field, value)))
}

fn parse_order_type(value: &str) -> OrderType {
    match value {
        "LIMIT" => OrderType::Limit,
        "STOP_MARKET" => OrderType::StopMarket,
        "TAKE_PROFIT_MARKET" => OrderType::TakeProfitMarket,
        _ => OrderType::Other,
    }
}

fn parse_side(value: &str) -> ExchangeResult<Side> {
    match value {
        "BUY" => Ok(Side::Long),
        "SELL" => Ok(Side::Short),
        other => Err(ExchangeError::Decode(format!("unknown order side {:?}", other))),
    }
}

/// Non-zero price field, `None` for the "0" the venue sends when unset
fn optional_price(field: &str, value: &str) -> ExchangeResult<Option<f64>> {
    let price = parse_f64(field, value)?;
    Ok((price != 0.0).then_some(price))
}

/// Kline rows are heterogeneous arrays: [openTime, "open", "high", "low", "close", "volume", ...]
fn parse_kline(symbol: &str, row: &[serde_json::Value]) -> ExchangeResult<Candle> {
    let number = |index: usize, name: &str| -> ExchangeResult<f64> {
        let value = row
            .get(index)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExchangeError::Decode(format!("kline missing {}", name)))?;
        parse_f64(name, value)
    };

    let open_time_ms = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExchangeError::Decode("kline missing open time".to_string()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_time_ms)
        .single()
        .ok_or_else(|| ExchangeError::Decode(format!("invalid open time {}", open_time_ms)))?;

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close: number(4, "close")?,
        volume: number(5, "volume")?,
    })
}

/// HMAC-SHA256 signature of the query string, hex encoded
pub fn sign(secret: &str, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

impl BinanceFuturesClient {
    pub fn new(config: BinanceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let per_minute = NonZeroU32::new(config.requests_per_minute)
            .context("requests_per_minute must be greater than zero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            config,
            precisions: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter,
        })
    }

    /// Unsigned market-data request
    async fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let mut url = format!("{}{}", self.config.base_url, path);
        if !params.is_empty() {
            url = format!("{}?{}", url, encode_query(params));
        }

        self.execute(Method::GET, &url, false).await
    }

    /// Signed account/trade request; adds timestamp, recvWindow and signature
    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> ExchangeResult<T> {
        params.push(("recvWindow", self.config.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = encode_query(&params);
        let signature = sign(&self.config.api_secret, &query);
        let url = format!(
            "{}{}?{}&signature={}",
            self.config.base_url, path, query, signature
        );

        self.execute(method, &url, true).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        authenticated: bool,
    ) -> ExchangeResult<T> {
        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        let mut request = self.client.request(method, url);
        if authenticated {
            request = request.header("X-MBX-APIKEY", &self.config.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::Timeout(self.config.request_timeout)
            } else {
                ExchangeError::Network(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        // 429 = over the request weight limit, 418 = IP banned for ignoring 429s
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(ExchangeError::RateLimited(format!("status {}: {}", status, body)));
        }

        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => Err(ExchangeError::Api {
                status: status.as_u16(),
                code: err.code,
                message: err.msg,
            }),
            Err(_) => Err(ExchangeError::Api {
                status: status.as_u16(),
                code: 0,
                message: body,
            }),
        }
    }

    /// Precision for a symbol, loading exchange info on first use
    async fn precision(&self, symbol: &str) -> ExchangeResult<SymbolPrecision> {
        if let Some(precision) = self.precisions.read().await.get(symbol) {
            return Ok(*precision);
        }

        let info: ExchangeInfo = self.public("/fapi/v1/exchangeInfo", &[]).await?;

        let mut cache = self.precisions.write().await;
        for entry in info.symbols {
            cache.insert(
                entry.symbol,
                SymbolPrecision {
                    price: entry.price_precision,
                    quantity: entry.quantity_precision,
                },
            );
        }
        tracing::debug!("Cached precision for {} symbols", cache.len());

        cache
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }
}

#[async_trait]
impl ExchangePort for BinanceFuturesClient {
    async fn get_balance(&self, asset: &str) -> ExchangeResult<f64> {
        let entries: Vec<BalanceEntry> = self
            .signed(Method::GET, "/fapi/v2/balance", Vec::new())
            .await?;

        let entry = entries
            .iter()
            .find(|e| e.asset == asset)
            .ok_or_else(|| ExchangeError::Decode(format!("no {} balance in account", asset)))?;

        parse_f64("balance", &entry.balance)
    }

    async fn list_symbols(&self) -> ExchangeResult<Vec<String>> {
        let tickers: Vec<TickerPrice> = self.public("/fapi/v1/ticker/price", &[]).await?;

        Ok(tickers
            .into_iter()
            .map(|t| t.symbol)
            .filter(|s| s.contains(&self.config.quote_asset))
            .collect())
    }

    async fn get_price(&self, symbol: &str) -> ExchangeResult<f64> {
        let ticker: TickerPrice = self
            .public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;

        parse_f64("price", &ticker.price)
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| parse_kline(symbol, row)).collect()
    }

    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> ExchangeResult<()> {
        let _: serde_json::Value = self
            .signed(
                Method::POST,
                "/fapi/v1/marginType",
                vec![
                    ("symbol", symbol.to_string()),
                    ("marginType", mode.as_str().to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, level: u32) -> ExchangeResult<()> {
        let _: serde_json::Value = self
            .signed(
                Method::POST,
                "/fapi/v1/leverage",
                vec![
                    ("symbol", symbol.to_string()),
                    ("leverage", level.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_price_precision(&self, symbol: &str) -> ExchangeResult<u32> {
        Ok(self.precision(symbol).await?.price)
    }

    async fn get_qty_precision(&self, symbol: &str) -> ExchangeResult<u32> {
        Ok(self.precision(symbol).await?.quantity)
    }

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<String> {
        let price = format_with_precision(request.price, request.price_precision);

        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_order_side().to_string()),
            ("type", request.order_type.as_str().to_string()),
            (
                "quantity",
                format_with_precision(request.quantity, request.qty_precision),
            ),
            ("timeInForce", "GTC".to_string()),
        ];

        match request.order_type {
            OrderType::Limit => params.push(("price", price)),
            _ => params.push(("stopPrice", price)),
        }

        if let Some(client_order_id) = &request.client_order_id {
            params.push(("newClientOrderId", client_order_id.clone()));
        }

        let response: NewOrderResponse = self
            .signed(Method::POST, "/fapi/v1/order", params)
            .await?;

        Ok(response.order_id.to_string())
    }

    async fn get_open_positions(&self) -> ExchangeResult<Vec<Position>> {
        let risks: Vec<PositionRisk> = self
            .signed(Method::GET, "/fapi/v2/positionRisk", Vec::new())
            .await?;

        let mut positions = Vec::new();
        for risk in risks {
            let signed_quantity = parse_f64("positionAmt", &risk.position_amt)?;
            if signed_quantity != 0.0 {
                positions.push(Position {
                    symbol: risk.symbol,
                    signed_quantity,
                });
            }
        }

        Ok(positions)
    }

    async fn get_open_orders(&self) -> ExchangeResult<Vec<OpenOrder>> {
        let entries: Vec<OrderEntry> = self
            .signed(Method::GET, "/fapi/v1/openOrders", Vec::new())
            .await?;

        entries
            .into_iter()
            .map(|entry| -> ExchangeResult<OpenOrder> {
                Ok(OpenOrder {
                    order_type: parse_order_type(&entry.order_type),
                    side: parse_side(&entry.side)?,
                    price: optional_price("price", &entry.price)?,
                    stop_price: optional_price("stopPrice", &entry.stop_price)?,
                    order_id: entry.order_id.to_string(),
                    symbol: entry.symbol,
                })
            })
            .collect()
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        let _: serde_json::Value = self
            .signed(
                Method::DELETE,
                "/fapi/v1/allOpenOrders",
                vec![("symbol", symbol.to_string())],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_is_hex_hmac_sha256() {
        // RFC 4231 test case 2
        assert_eq!(
            sign("Jefe", "what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_parse_kline_row() {
        let row = vec![
            json!(1_700_000_000_000i64),
            json!("100.5"),
            json!("101.0"),
            json!("99.5"),
            json!("100.8"),
            json!("1234.5"),
            json!(1_700_000_899_999i64),
        ];

        let candle = parse_kline("BTCUSDT", &row).unwrap();
        assert_eq!(candle.open_time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(candle.close, 100.8);
        assert_eq!(candle.volume, 1234.5);
    }

    #[test]
    fn test_parse_kline_rejects_short_row() {
        let row = vec![json!(1_700_000_000_000i64), json!("100.5")];
        assert!(parse_kline("BTCUSDT", &row).is_err());
    }

    #[test]
    fn test_optional_price_treats_zero_as_unset() {
        assert_eq!(optional_price("price", "0").unwrap(), None);
        assert_eq!(optional_price("stopPrice", "99.1").unwrap(), Some(99.1));
    }

    #[test]
    fn test_encode_query_keeps_order() {
        let params = vec![("symbol", "ETHUSDT".to_string()), ("limit", "500".to_string())];
        assert_eq!(encode_query(&params), "symbol=ETHUSDT&limit=500");
    }
}
