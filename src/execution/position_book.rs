use std::collections::HashSet;

use crate::exchange::ExchangePort;
use crate::models::{OpenOrder, Position};

/// Snapshot of what is open on the venue for one cycle
///
/// Built from the positions and orders fetched at the start of a cycle (and
/// again after each placement). Reconciliation is pure: building the book
/// twice from the same inputs gives the same answers.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    open_symbols: Vec<String>,
    order_symbols: Vec<String>,
}

/// Deduplicate while keeping first-seen order
fn unique_in_order<'a>(symbols: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}

impl PositionBook {
    pub fn reconcile(positions: &[Position], orders: &[OpenOrder]) -> Self {
        Self {
            open_symbols: unique_in_order(
                positions
                    .iter()
                    .filter(|p| p.is_open())
                    .map(|p| p.symbol.as_str()),
            ),
            order_symbols: unique_in_order(orders.iter().map(|o| o.symbol.as_str())),
        }
    }

    /// Symbols with a non-zero position
    pub fn open_symbols(&self) -> &[String] {
        &self.open_symbols
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.open_symbols.iter().any(|s| s == symbol)
    }

    pub fn has_open_orders(&self, symbol: &str) -> bool {
        self.order_symbols.iter().any(|s| s == symbol)
    }

    /// Symbols with resting orders but no position (filled stop/target leftovers,
    /// or entries that never filled)
    pub fn stale_order_symbols(&self) -> Vec<String> {
        self.order_symbols
            .iter()
            .filter(|s| !self.has_open_position(s))
            .cloned()
            .collect()
    }

    /// Symbols holding either a position or a resting order
    pub fn committed_count(&self) -> usize {
        self.open_symbols.len()
            + self
                .order_symbols
                .iter()
                .filter(|s| !self.has_open_position(s))
                .count()
    }

    /// Whether a new bracket may be opened on `symbol`
    pub fn eligible_for_entry(
        &self,
        symbol: &str,
        excluded: &HashSet<String>,
        last_traded: Option<&str>,
    ) -> bool {
        !self.has_open_position(symbol)
            && !self.has_open_orders(symbol)
            && !excluded.contains(symbol)
            && last_traded != Some(symbol)
    }

    /// Cancel all orders on every stale symbol, one call per symbol
    ///
    /// Failures are logged and do not stop the remaining cancellations.
    /// Returns the symbols that were cancelled successfully.
    pub async fn cancel_stale_orders<E: ExchangePort + ?Sized>(&self, exchange: &E) -> Vec<String> {
        let mut cancelled = Vec::new();

        for symbol in self.stale_order_symbols() {
            match exchange.cancel_all_orders(&symbol).await {
                Ok(()) => {
                    tracing::info!("🧹 Cancelled leftover orders for {} (no open position)", symbol);
                    cancelled.push(symbol);
                }
                Err(e) => {
                    tracing::warn!("  ✗ Failed to cancel orders for {}: {}", symbol, e);
                }
            }
        }

        cancelled
    }
}
