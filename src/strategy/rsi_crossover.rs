use super::{signals::closing_prices, SignalSource};
use crate::indicators::rsi_series;
use crate::models::{Candle, Signal};

/// RSI threshold-crossing strategy
///
/// Goes long when RSI climbs back out of oversold territory and short when it
/// falls back out of overbought territory. Only the last two RSI values matter.
#[derive(Debug, Clone)]
pub struct RsiCrossoverStrategy {
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiCrossoverStrategy {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl RsiCrossoverStrategy {
    /// Decide from the previous and current RSI values
    pub fn decide(&self, previous_rsi: f64, current_rsi: f64) -> Signal {
        if previous_rsi < self.oversold && current_rsi >= self.oversold {
            Signal::Up
        } else if previous_rsi > self.overbought && current_rsi <= self.overbought {
            Signal::Down
        } else {
            Signal::None
        }
    }
}

impl SignalSource for RsiCrossoverStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles_required() {
            return Signal::None;
        }

        let rsi = rsi_series(&closing_prices(candles), self.rsi_period);
        match rsi.as_slice() {
            [.., previous, current] => {
                tracing::debug!("RSI {:.1} -> {:.1}", previous, current);
                self.decide(*previous, *current)
            }
            _ => Signal::None,
        }
    }

    fn name(&self) -> &str {
        "RsiCrossover"
    }

    fn min_candles_required(&self) -> usize {
        // Two RSI values: period + 1 prices for the first, one more for the second
        self.rsi_period + 2
    }
}
