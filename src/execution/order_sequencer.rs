use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::EngineError;
use crate::exchange::ExchangePort;
use crate::models::{round_to_precision, OrderRequest, OrderType, Side};
use crate::persistence::BracketJournal;

/// Where a bracket sequence currently stands
///
/// ```text
/// Idle -> EntryPlaced -> StopPlaced -> TargetPlaced
///   |          |             |
/// EntryFailed StopFailed  TargetFailed
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BracketState {
    Idle,
    EntryPlaced,
    StopPlaced,
    TargetPlaced,
    EntryFailed,
    StopFailed,
    TargetFailed,
}

impl BracketState {
    pub fn can_transition_to(&self, next: BracketState) -> bool {
        use BracketState::*;
        matches!(
            (self, next),
            (Idle, EntryPlaced)
                | (Idle, EntryFailed)
                | (EntryPlaced, StopPlaced)
                | (EntryPlaced, StopFailed)
                | (StopPlaced, TargetPlaced)
                | (StopPlaced, TargetFailed)
        )
    }

    /// Entry is live but at least one protective order is missing
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            BracketState::EntryPlaced
                | BracketState::StopPlaced
                | BracketState::StopFailed
                | BracketState::TargetFailed
        )
    }
}

impl fmt::Display for BracketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Order sizing and protection settings
#[derive(Debug, Clone)]
pub struct BracketParams {
    /// Quote-asset value of each entry (before leverage)
    pub notional: f64,
    pub stop_loss_fraction: f64,
    pub take_profit_fraction: f64,
    /// Pause between legs so the venue registers the previous order
    pub settle_delay: Duration,
}

impl Default for BracketParams {
    fn default() -> Self {
        Self {
            notional: 10.0,
            stop_loss_fraction: 0.009,
            take_profit_fraction: 0.012,
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Prices and size for one bracket attempt, computed once
#[derive(Debug, Clone, PartialEq)]
pub struct BracketOrderPlan {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub price_precision: u32,
    pub qty_precision: u32,
}

impl BracketOrderPlan {
    /// Compute a plan from the current price
    ///
    /// Every price and the quantity are rounded to the symbol's precisions.
    /// Fails if the price is unusable, the notional rounds to a zero quantity,
    /// or rounding collapses the stop/target onto the entry.
    pub fn compute(
        symbol: &str,
        side: Side,
        current_price: f64,
        price_precision: u32,
        qty_precision: u32,
        params: &BracketParams,
    ) -> Result<Self, EngineError> {
        if !current_price.is_finite() || current_price <= 0.0 {
            return Err(EngineError::validation(
                symbol,
                format!("unusable price {}", current_price),
            ));
        }

        let round_price = |value: f64| {
            round_to_precision(value, price_precision)
                .ok_or_else(|| EngineError::validation(symbol, format!("cannot round {}", value)))
        };

        let entry_price = round_price(current_price)?;
        let quantity = round_to_precision(params.notional / current_price, qty_precision)
            .ok_or_else(|| EngineError::validation(symbol, "cannot compute quantity"))?;

        if quantity <= 0.0 {
            return Err(EngineError::validation(
                symbol,
                format!(
                    "notional {} at price {} rounds to zero quantity ({} decimals)",
                    params.notional, current_price, qty_precision
                ),
            ));
        }

        let stop_offset = entry_price * params.stop_loss_fraction;
        let target_offset = entry_price * params.take_profit_fraction;

        let (stop_price, take_profit_price) = match side {
            Side::Long => (
                round_price(entry_price - stop_offset)?,
                round_price(entry_price + target_offset)?,
            ),
            Side::Short => (
                round_price(entry_price + stop_offset)?,
                round_price(entry_price - target_offset)?,
            ),
        };

        let plan = Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            entry_price,
            quantity,
            stop_price,
            take_profit_price,
            price_precision,
            qty_precision,
        };

        if !plan.protects_entry() {
            return Err(EngineError::validation(
                symbol,
                format!(
                    "stop {} / target {} not on the correct side of entry {} after rounding",
                    plan.stop_price, plan.take_profit_price, plan.entry_price
                ),
            ));
        }

        Ok(plan)
    }

    /// Stop and target sit on the correct side of the entry
    pub fn protects_entry(&self) -> bool {
        match self.side {
            Side::Long => self.stop_price < self.entry_price && self.entry_price < self.take_profit_price,
            Side::Short => self.take_profit_price < self.entry_price && self.entry_price < self.stop_price,
        }
    }

    fn request(&self, order_type: OrderType, side: Side, price: f64, leg: &str) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side,
            order_type,
            quantity: self.quantity,
            price,
            qty_precision: self.qty_precision,
            price_precision: self.price_precision,
            client_order_id: Some(format!("{}-{}", self.id.simple(), leg)),
        }
    }

    pub fn entry_request(&self) -> OrderRequest {
        self.request(OrderType::Limit, self.side, self.entry_price, "en")
    }

    pub fn stop_request(&self) -> OrderRequest {
        self.request(OrderType::StopMarket, self.side.opposite(), self.stop_price, "sl")
    }

    pub fn target_request(&self) -> OrderRequest {
        self.request(
            OrderType::TakeProfitMarket,
            self.side.opposite(),
            self.take_profit_price,
            "tp",
        )
    }
}

/// Journaled snapshot of a bracket sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketRecord {
    pub bracket_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub state: BracketState,
    pub entry_order_id: Option<String>,
    pub stop_order_id: Option<String>,
    pub target_order_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BracketRecord {
    pub fn new(plan: &BracketOrderPlan) -> Self {
        Self {
            bracket_id: plan.id,
            symbol: plan.symbol.clone(),
            side: plan.side,
            state: BracketState::Idle,
            entry_order_id: None,
            stop_order_id: None,
            target_order_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Move to `next`, ignoring transitions the state machine does not allow
    pub fn advance(&mut self, next: BracketState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                "Refusing bracket transition {} -> {} for {}",
                self.state,
                next,
                self.symbol
            );
            return false;
        }

        self.state = next;
        self.updated_at = Utc::now();
        true
    }
}

/// A fully established bracket
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBracket {
    pub plan: BracketOrderPlan,
    pub entry_order_id: String,
    pub stop_order_id: String,
    pub target_order_id: String,
}

/// Places entry, stop-loss and take-profit orders one after another
///
/// The venue only offers independent orders, so the three legs are sent in
/// sequence with a settle delay between them. Nothing is retried and nothing
/// is rolled back: a failed protective order leaves the entry live and is
/// reported as [`EngineError::DegradedBracket`].
pub struct OrderSequencer {
    params: BracketParams,
    journal: Option<Arc<dyn BracketJournal>>,
}

impl OrderSequencer {
    pub fn new(params: BracketParams) -> Self {
        Self {
            params,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<dyn BracketJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fetch price and precisions and compute the plan
    pub async fn plan<E: ExchangePort + ?Sized>(
        &self,
        exchange: &E,
        symbol: &str,
        side: Side,
    ) -> Result<BracketOrderPlan, EngineError> {
        let price = exchange
            .get_price(symbol)
            .await
            .map_err(|e| EngineError::transient("fetch price", e))?;
        let price_precision = exchange
            .get_price_precision(symbol)
            .await
            .map_err(|e| EngineError::transient("fetch price precision", e))?;
        let qty_precision = exchange
            .get_qty_precision(symbol)
            .await
            .map_err(|e| EngineError::transient("fetch quantity precision", e))?;

        BracketOrderPlan::compute(symbol, side, price, price_precision, qty_precision, &self.params)
    }

    /// Run the full entry → stop → target sequence for `symbol`
    pub async fn execute<E: ExchangePort + ?Sized>(
        &self,
        exchange: &E,
        symbol: &str,
        side: Side,
    ) -> Result<PlacedBracket, EngineError> {
        let plan = self.plan(exchange, symbol, side).await?;
        let mut record = BracketRecord::new(&plan);

        tracing::info!(
            "📝 {} {} plan: qty {} @ {} | SL {} | TP {}",
            plan.symbol,
            plan.side,
            plan.quantity,
            plan.entry_price,
            plan.stop_price,
            plan.take_profit_price
        );

        // Idle -> EntryPlaced
        let entry_order_id = match exchange.place_order(&plan.entry_request()).await {
            Ok(order_id) => order_id,
            Err(e) => {
                record.advance(BracketState::EntryFailed);
                self.journal(&record).await;
                tracing::warn!("  ✗ Entry order for {} rejected: {}", symbol, e);
                return Err(EngineError::transient("place entry order", e));
            }
        };
        record.entry_order_id = Some(entry_order_id.clone());
        record.advance(BracketState::EntryPlaced);
        self.journal(&record).await;
        tracing::info!("  ✓ Entry {} placed for {}", entry_order_id, symbol);

        // EntryPlaced -> StopPlaced
        tokio::time::sleep(self.params.settle_delay).await;
        let stop_order_id = match exchange.place_order(&plan.stop_request()).await {
            Ok(order_id) => order_id,
            Err(e) => return Err(self.degrade(&mut record, BracketState::StopFailed, e).await),
        };
        record.stop_order_id = Some(stop_order_id.clone());
        record.advance(BracketState::StopPlaced);
        self.journal(&record).await;
        tracing::info!("  ✓ Stop-loss {} placed at {}", stop_order_id, plan.stop_price);

        // StopPlaced -> TargetPlaced
        tokio::time::sleep(self.params.settle_delay).await;
        let target_order_id = match exchange.place_order(&plan.target_request()).await {
            Ok(order_id) => order_id,
            Err(e) => return Err(self.degrade(&mut record, BracketState::TargetFailed, e).await),
        };
        record.target_order_id = Some(target_order_id.clone());
        record.advance(BracketState::TargetPlaced);
        self.journal(&record).await;
        tracing::info!(
            "  ✓ Take-profit {} placed at {}",
            target_order_id,
            plan.take_profit_price
        );

        Ok(PlacedBracket {
            plan,
            entry_order_id,
            stop_order_id,
            target_order_id,
        })
    }

    async fn degrade(
        &self,
        record: &mut BracketRecord,
        state: BracketState,
        source: crate::error::ExchangeError,
    ) -> EngineError {
        record.advance(state);
        self.journal(record).await;

        tracing::error!(
            "🚨 DEGRADED bracket for {} ({}): entry {} is live without full protection: {}",
            record.symbol,
            state,
            record.entry_order_id.as_deref().unwrap_or("?"),
            source
        );

        EngineError::DegradedBracket {
            symbol: record.symbol.clone(),
            state,
            source,
        }
    }

    async fn journal(&self, record: &BracketRecord) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(record).await {
                tracing::warn!("Failed to journal bracket for {}: {}", record.symbol, e);
            }
        }
    }
}
