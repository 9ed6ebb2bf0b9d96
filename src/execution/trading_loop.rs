use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::exchange::ExchangePort;
use crate::execution::order_sequencer::OrderSequencer;
use crate::execution::position_book::PositionBook;
use crate::models::{CandleInterval, MarginMode, Signal};
use crate::persistence::BracketJournal;
use crate::risk::{PositionCap, PositionCapTrip};
use crate::strategy::signals::validate_candle_uniformity;
use crate::strategy::SignalSource;

// ============================================================================
// State & Settings
// ============================================================================

/// State carried from one cycle to the next, in memory only
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    /// Symbol of the most recent bracket attempt that reached the venue
    pub last_traded_symbol: Option<String>,
    pub cycle_count: u64,
}

/// Loop-level settings
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub quote_asset: String,
    pub candle_interval: CandleInterval,
    pub candle_limit: u32,
    pub leverage: u32,
    pub margin_mode: MarginMode,
    pub excluded_symbols: HashSet<String>,
    pub cycle_interval: Duration,
    pub post_trade_cooldown: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            candle_interval: CandleInterval::FifteenMinutes,
            candle_limit: 500,
            leverage: 10,
            margin_mode: MarginMode::Isolated,
            excluded_symbols: HashSet::from(["USDCUSDT".to_string()]),
            cycle_interval: Duration::from_secs(180),
            post_trade_cooldown: Duration::from_secs(10),
        }
    }
}

/// What happened during one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// True when the cycle was abandoned before scanning symbols
    pub skipped: bool,
    pub balance: Option<f64>,
    pub cancelled: Vec<String>,
    pub placed: Vec<String>,
    pub degraded: Vec<String>,
}

// ============================================================================
// Trading Loop
// ============================================================================

/// Cycle scheduler tying signals, reconciliation and order placement together
pub struct TradingLoop {
    exchange: Arc<dyn ExchangePort>,
    settings: LoopSettings,
    strategy: Box<dyn SignalSource>,
    cap: PositionCap,
    sequencer: OrderSequencer,
    journal: Option<Arc<dyn BracketJournal>>,
    symbols: Vec<String>,
}

impl TradingLoop {
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        settings: LoopSettings,
        strategy: Box<dyn SignalSource>,
        cap: PositionCap,
        sequencer: OrderSequencer,
    ) -> Self {
        Self {
            exchange,
            settings,
            strategy,
            cap,
            sequencer,
            journal: None,
            symbols: Vec::new(),
        }
    }

    /// Journal bracket progress (shared with the sequencer)
    pub fn with_journal(mut self, journal: Arc<dyn BracketJournal>) -> Self {
        self.sequencer = self.sequencer.with_journal(journal.clone());
        self.journal = Some(journal);
        self
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Fetch the tradable symbol list, keeping the old one on failure
    pub async fn refresh_symbols(&mut self) {
        match self.exchange.list_symbols().await {
            Ok(symbols) => {
                tracing::info!(
                    "🔍 Tracking {} {} symbols",
                    symbols.len(),
                    self.settings.quote_asset
                );
                self.symbols = symbols;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch symbol list: {}", e);
            }
        }
    }

    /// Run cycles until `cancel` fires
    ///
    /// Cancellation is honoured between symbols and during the inter-cycle
    /// sleep. A bracket sequence in progress always runs to completion.
    pub async fn run(&mut self, cancel: CancellationToken) -> EngineState {
        let mut state = EngineState::default();

        tracing::info!(
            "🔄 Trading loop started: strategy {}, cycle every {:?}",
            self.strategy.name(),
            self.settings.cycle_interval
        );

        while !cancel.is_cancelled() {
            self.run_cycle(&mut state, &cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.cycle_interval) => {}
            }
        }

        tracing::info!("Trading loop stopped after {} cycles", state.cycle_count);
        state
    }

    /// Run exactly one cycle
    pub async fn run_cycle(
        &mut self,
        state: &mut EngineState,
        cancel: &CancellationToken,
    ) -> CycleReport {
        state.cycle_count += 1;
        let mut report = CycleReport::default();

        tracing::info!("\n=== Cycle #{} ===", state.cycle_count);

        // 1. Balance doubles as the connectivity and permissions check
        match self.exchange.get_balance(&self.settings.quote_asset).await {
            Ok(balance) => {
                tracing::info!("💰 Balance: {:.2} {}", balance, self.settings.quote_asset);
                report.balance = Some(balance);
            }
            Err(e) => {
                if e.is_auth() {
                    tracing::error!("🔑 API key rejected, check key permissions and IP whitelist");
                }
                let err = EngineError::transient("fetch balance", e);
                tracing::warn!("⚠️  {} - skipping cycle", err);
                report.skipped = true;
                return report;
            }
        }

        if self.symbols.is_empty() {
            self.refresh_symbols().await;
        }

        // 2. Reconcile and clean up leftovers
        let Some(mut book) = self.fetch_book().await else {
            report.skipped = true;
            return report;
        };

        report.cancelled = book.cancel_stale_orders(self.exchange.as_ref()).await;
        if !report.cancelled.is_empty() {
            match self.fetch_book().await {
                Some(refreshed) => book = refreshed,
                None => {
                    report.skipped = true;
                    return report;
                }
            }
        }

        self.prune_journal(&book).await;

        tracing::info!(
            "📊 Open positions: {} ({}) | committed {}/{}",
            book.open_symbols().len(),
            book.open_symbols().join(", "),
            book.committed_count(),
            self.cap.max_concurrent_positions
        );

        // 3. Scan symbols for entries
        let symbols = self.symbols.clone();
        for symbol in &symbols {
            if let Err(PositionCapTrip::MaxConcurrentPositions { committed, max }) =
                self.cap.check(book.committed_count())
            {
                tracing::info!("🛑 Position cap reached ({}/{}), no new entries", committed, max);
                break;
            }

            if cancel.is_cancelled() {
                tracing::info!("Cancellation requested, stopping symbol scan");
                break;
            }

            if !book.eligible_for_entry(
                symbol,
                &self.settings.excluded_symbols,
                state.last_traded_symbol.as_deref(),
            ) {
                continue;
            }

            let signal = self.evaluate_symbol(symbol).await;
            let Some(side) = signal.side() else {
                continue;
            };

            tracing::info!("📈 {} signal {:?} → opening {} bracket", symbol, signal, side);

            self.prepare_symbol(symbol).await;

            match self.sequencer.execute(self.exchange.as_ref(), symbol, side).await {
                Ok(placed) => {
                    tracing::info!(
                        "✅ Bracket established for {} ({})",
                        symbol,
                        placed.plan.id
                    );
                    report.placed.push(symbol.clone());
                    state.last_traded_symbol = Some(symbol.clone());
                }
                Err(EngineError::DegradedBracket { .. }) => {
                    report.degraded.push(symbol.clone());
                    state.last_traded_symbol = Some(symbol.clone());
                }
                Err(e @ EngineError::Validation { .. }) => {
                    tracing::warn!("Skipping {}: {}", symbol, e);
                    continue;
                }
                Err(e @ EngineError::TransientApi { .. }) => {
                    tracing::warn!("⚠️  {} - moving on", e);
                    if !e.outcome_unknown() {
                        continue;
                    }

                    // The entry may be resting on the venue anyway
                    match self.fetch_book().await {
                        Some(refreshed) => book = refreshed,
                        None => break,
                    }
                    continue;
                }
            }

            // Let the venue settle, then re-read state so the cap holds within the cycle
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settings.post_trade_cooldown) => {}
            }

            match self.fetch_book().await {
                Some(refreshed) => book = refreshed,
                None => break,
            }
        }

        tracing::info!(
            "Cycle #{} done: {} placed, {} degraded, {} cancelled",
            state.cycle_count,
            report.placed.len(),
            report.degraded.len(),
            report.cancelled.len()
        );

        report
    }

    async fn fetch_book(&self) -> Option<PositionBook> {
        let positions = match self.exchange.get_open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!("⚠️  {}", EngineError::transient("fetch positions", e));
                return None;
            }
        };

        let orders = match self.exchange.get_open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!("⚠️  {}", EngineError::transient("fetch open orders", e));
                return None;
            }
        };

        Some(PositionBook::reconcile(&positions, &orders))
    }

    /// Fetch closed candles for `symbol` and run the strategy
    async fn evaluate_symbol(&self, symbol: &str) -> Signal {
        let interval = self.settings.candle_interval;

        let mut candles = match self
            .exchange
            .get_candles(symbol, interval, self.settings.candle_limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!("Failed to fetch candles for {}: {}", symbol, e);
                return Signal::None;
            }
        };

        // The venue returns the still-forming candle last
        let now = Utc::now();
        if candles.last().is_some_and(|c| !c.is_closed_at(now, interval)) {
            candles.pop();
        }

        let interval_secs = interval.duration().num_seconds().max(0) as u64;
        if let Err(e) = validate_candle_uniformity(&candles, interval_secs) {
            tracing::warn!("Skipping {}: {}", symbol, e);
            return Signal::None;
        }

        let signal = self.strategy.generate_signal(&candles);
        if signal != Signal::None {
            tracing::debug!(
                "{} on {} ({} candles): {:?}",
                self.strategy.name(),
                symbol,
                candles.len(),
                signal
            );
        }

        signal
    }

    /// Set margin mode and leverage; failures are logged and ignored
    async fn prepare_symbol(&self, symbol: &str) {
        if let Err(e) = self
            .exchange
            .set_margin_mode(symbol, self.settings.margin_mode)
            .await
        {
            tracing::warn!(
                "Margin mode {} not applied for {}: {}",
                self.settings.margin_mode.as_str(),
                symbol,
                e
            );
        }

        if let Err(e) = self
            .exchange
            .set_leverage(symbol, self.settings.leverage)
            .await
        {
            tracing::warn!(
                "Leverage {}x not applied for {}: {}",
                self.settings.leverage,
                symbol,
                e
            );
        }
    }

    /// Drop journal records for symbols that have neither a position nor orders
    async fn prune_journal(&self, book: &PositionBook) {
        let Some(journal) = &self.journal else {
            return;
        };

        let records = match journal.load_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to read bracket journal: {}", e);
                return;
            }
        };

        for record in records {
            if book.has_open_position(&record.symbol) || book.has_open_orders(&record.symbol) {
                continue;
            }

            if let Err(e) = journal.remove(&record.symbol).await {
                tracing::warn!("Failed to prune journal entry for {}: {}", record.symbol, e);
            } else {
                tracing::debug!("Pruned finished bracket for {}", record.symbol);
            }
        }
    }
}
