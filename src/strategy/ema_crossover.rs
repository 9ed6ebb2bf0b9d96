use super::{
    signals::{closing_prices, crossed_above, crossed_below, last_three},
    SignalSource,
};
use crate::indicators::ema_series;
use crate::models::{Candle, Signal};

/// Fast/slow EMA crossover (50 over 200 by default)
#[derive(Debug, Clone)]
pub struct EmaCrossoverStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl Default for EmaCrossoverStrategy {
    fn default() -> Self {
        Self {
            fast_period: 50,
            slow_period: 200,
        }
    }
}

impl EmaCrossoverStrategy {
    pub fn decide(&self, fast: [f64; 3], slow: [f64; 3]) -> Signal {
        if crossed_above(fast, slow) {
            Signal::Up
        } else if crossed_below(fast, slow) {
            Signal::Down
        } else {
            Signal::None
        }
    }
}

impl SignalSource for EmaCrossoverStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles_required() {
            return Signal::None;
        }

        let prices = closing_prices(candles);
        let (Some(fast), Some(slow)) = (
            last_three(&ema_series(&prices, self.fast_period)),
            last_three(&ema_series(&prices, self.slow_period)),
        ) else {
            return Signal::None;
        };

        tracing::debug!(
            "EMA{}={:.4}, EMA{}={:.4}",
            self.fast_period,
            fast[2],
            self.slow_period,
            slow[2]
        );

        self.decide(fast, slow)
    }

    fn name(&self) -> &str {
        "EmaCrossover"
    }

    fn min_candles_required(&self) -> usize {
        self.fast_period.max(self.slow_period) + 2
    }
}
