use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::{ExchangePort, ExchangeResult};
use crate::error::ExchangeError;
use crate::models::{
    Candle, CandleInterval, MarginMode, OpenOrder, OrderRequest, OrderType, Position, Side,
    SymbolPrecision,
};

/// Exchange call recorded by [`FakeExchange`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Balance,
    ListSymbols,
    Price(String),
    Candles(String),
    MarginMode(String),
    Leverage(String),
    PlaceOrder(OrderRequest),
    Positions,
    Orders,
    CancelAll(String),
}

#[derive(Default)]
struct FakeState {
    symbols: Vec<String>,
    candles: HashMap<String, Vec<Candle>>,
    prices: HashMap<String, f64>,
    precisions: HashMap<String, SymbolPrecision>,
    positions: Vec<Position>,
    orders: Vec<OpenOrder>,
    fill_entries: bool,
    failing_orders: HashSet<OrderType>,
    fail_balance: bool,
    fail_margin: bool,
    fail_leverage: bool,
    time_out_entries: bool,
    next_order_id: u64,
    calls: Vec<Call>,
}

/// In-memory venue for engine tests
///
/// Records every call, can fail selected operations, and optionally turns
/// limit entries into positions straight away.
#[derive(Default)]
pub struct FakeExchange {
    state: Mutex<FakeState>,
}

fn api_failure(message: &str) -> ExchangeError {
    ExchangeError::Api {
        status: 400,
        code: -1000,
        message: message.to_string(),
    }
}

impl FakeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols(self, symbols: &[&str]) -> Self {
        self.state.lock().unwrap().symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.state
            .lock()
            .unwrap()
            .candles
            .insert(symbol.to_string(), candles);
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.state.lock().unwrap().prices.insert(symbol.to_string(), price);
    }

    pub fn set_precision(&self, symbol: &str, price: u32, quantity: u32) {
        self.state
            .lock()
            .unwrap()
            .precisions
            .insert(symbol.to_string(), SymbolPrecision { price, quantity });
    }

    pub fn add_position(&self, symbol: &str, signed_quantity: f64) {
        self.state.lock().unwrap().positions.push(Position {
            symbol: symbol.to_string(),
            signed_quantity,
        });
    }

    pub fn add_order(&self, symbol: &str, order_type: OrderType) {
        let mut state = self.state.lock().unwrap();
        state.next_order_id += 1;
        let order_id = state.next_order_id.to_string();
        state.orders.push(OpenOrder {
            symbol: symbol.to_string(),
            order_id,
            order_type,
            side: Side::Short,
            price: None,
            stop_price: Some(1.0),
        });
    }

    pub fn fill_entries(&self, fill: bool) {
        self.state.lock().unwrap().fill_entries = fill;
    }

    pub fn fail_orders_of_type(&self, order_type: OrderType) {
        self.state.lock().unwrap().failing_orders.insert(order_type);
    }

    /// Accept limit entries but answer with a timeout
    pub fn time_out_entries(&self, time_out: bool) {
        self.state.lock().unwrap().time_out_entries = time_out;
    }

    pub fn fail_balance(&self, fail: bool) {
        self.state.lock().unwrap().fail_balance = fail;
    }

    pub fn fail_margin_and_leverage(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_margin = true;
        state.fail_leverage = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PlaceOrder(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CancelAll(symbol) => Some(symbol),
                _ => None,
            })
            .collect()
    }

    pub fn open_position_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .positions
            .iter()
            .filter(|p| p.is_open())
            .count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ExchangePort for FakeExchange {
    async fn get_balance(&self, _asset: &str) -> ExchangeResult<f64> {
        self.record(Call::Balance);
        if self.state.lock().unwrap().fail_balance {
            return Err(ExchangeError::Api {
                status: 401,
                code: -2015,
                message: "Invalid API-key, IP, or permissions for action.".to_string(),
            });
        }
        Ok(1000.0)
    }

    async fn list_symbols(&self) -> ExchangeResult<Vec<String>> {
        self.record(Call::ListSymbols);
        Ok(self.state.lock().unwrap().symbols.clone())
    }

    async fn get_price(&self, symbol: &str) -> ExchangeResult<f64> {
        self.record(Call::Price(symbol.to_string()));
        Ok(*self.state.lock().unwrap().prices.get(symbol).unwrap_or(&100.0))
    }

    async fn get_candles(
        &self,
        symbol: &str,
        _interval: CandleInterval,
        _limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        self.record(Call::Candles(symbol.to_string()));
        Ok(self
            .state
            .lock()
            .unwrap()
            .candles
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_margin_mode(&self, symbol: &str, _mode: MarginMode) -> ExchangeResult<()> {
        self.record(Call::MarginMode(symbol.to_string()));
        if self.state.lock().unwrap().fail_margin {
            return Err(api_failure("No need to change margin type."));
        }
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, _level: u32) -> ExchangeResult<()> {
        self.record(Call::Leverage(symbol.to_string()));
        if self.state.lock().unwrap().fail_leverage {
            return Err(api_failure("Leverage not changed."));
        }
        Ok(())
    }

    async fn get_price_precision(&self, symbol: &str) -> ExchangeResult<u32> {
        let state = self.state.lock().unwrap();
        Ok(state.precisions.get(symbol).map(|p| p.price).unwrap_or(1))
    }

    async fn get_qty_precision(&self, symbol: &str) -> ExchangeResult<u32> {
        let state = self.state.lock().unwrap();
        Ok(state.precisions.get(symbol).map(|p| p.quantity).unwrap_or(3))
    }

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<String> {
        self.record(Call::PlaceOrder(request.clone()));

        let mut state = self.state.lock().unwrap();
        if state.failing_orders.contains(&request.order_type) {
            return Err(api_failure("Order rejected."));
        }

        state.next_order_id += 1;
        let order_id = state.next_order_id.to_string();

        if request.order_type == OrderType::Limit && state.fill_entries {
            let signed_quantity = match request.side {
                Side::Long => request.quantity,
                Side::Short => -request.quantity,
            };
            state.positions.push(Position {
                symbol: request.symbol.clone(),
                signed_quantity,
            });
        } else {
            let (price, stop_price) = match request.order_type {
                OrderType::Limit => (Some(request.price), None),
                _ => (None, Some(request.price)),
            };
            state.orders.push(OpenOrder {
                symbol: request.symbol.clone(),
                order_id: order_id.clone(),
                order_type: request.order_type,
                side: request.side,
                price,
                stop_price,
            });
        }

        if request.order_type == OrderType::Limit && state.time_out_entries {
            return Err(ExchangeError::Timeout(Duration::from_secs(10)));
        }

        Ok(order_id)
    }

    async fn get_open_positions(&self) -> ExchangeResult<Vec<Position>> {
        self.record(Call::Positions);
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn get_open_orders(&self) -> ExchangeResult<Vec<OpenOrder>> {
        self.record(Call::Orders);
        Ok(self.state.lock().unwrap().orders.clone())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> ExchangeResult<()> {
        self.record(Call::CancelAll(symbol.to_string()));
        self.state
            .lock()
            .unwrap()
            .orders
            .retain(|o| o.symbol != symbol);
        Ok(())
    }
}
