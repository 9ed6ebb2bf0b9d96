// Trading strategy module
pub mod ema_crossover;
pub mod macd_ema;
pub mod rsi_crossover;
pub mod signals;
pub mod stoch_rsi_ema;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Candle, Signal};

pub use ema_crossover::EmaCrossoverStrategy;
pub use macd_ema::MacdEmaStrategy;
pub use rsi_crossover::RsiCrossoverStrategy;
pub use stoch_rsi_ema::StochRsiEmaStrategy;

/// Base trait for all signal strategies
///
/// Implementations are pure functions of the closing-price series: they never
/// mutate the candles and return `Signal::None` when there is not enough history.
pub trait SignalSource: Send + Sync {
    /// Generate a directional signal from candles ordered oldest first
    fn generate_signal(&self, candles: &[Candle]) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}

/// Strategy selected by configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RsiCrossover,
    StochRsiEma,
    MacdEma,
    EmaCrossover,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::RsiCrossover
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.build().name())
    }
}

impl StrategyKind {
    /// Build the strategy with its default parameters
    pub fn build(&self) -> Box<dyn SignalSource> {
        match self {
            StrategyKind::RsiCrossover => Box::new(RsiCrossoverStrategy::default()),
            StrategyKind::StochRsiEma => Box::new(StochRsiEmaStrategy::default()),
            StrategyKind::MacdEma => Box::new(MacdEmaStrategy::default()),
            StrategyKind::EmaCrossover => Box::new(EmaCrossoverStrategy::default()),
        }
    }
}

/// Evaluate candles with the given strategy
pub fn evaluate(candles: &[Candle], strategy: StrategyKind) -> Signal {
    strategy.build().generate_signal(candles)
}
