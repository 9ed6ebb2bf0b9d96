use super::{signals::closing_prices, signals::last_three, SignalSource};
use crate::indicators::{calculate_ema, macd_histogram_series, macd_warmup};
use crate::models::{Candle, Signal};

/// MACD histogram flip filtered by the long EMA
///
/// Long when the histogram was negative for two candles and turns positive
/// while price trades above the EMA. Short is mirrored.
#[derive(Debug, Clone)]
pub struct MacdEmaStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub ema_period: usize,
}

impl Default for MacdEmaStrategy {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            ema_period: 200,
        }
    }
}

impl MacdEmaStrategy {
    pub fn decide(&self, histogram: [f64; 3], close: f64, ema: f64) -> Signal {
        let [h3, h2, h1] = histogram;

        if h3 < 0.0 && h2 < 0.0 && h1 > 0.0 && close > ema {
            Signal::Up
        } else if h3 > 0.0 && h2 > 0.0 && h1 < 0.0 && close < ema {
            Signal::Down
        } else {
            Signal::None
        }
    }
}

impl SignalSource for MacdEmaStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles_required() {
            return Signal::None;
        }

        let prices = closing_prices(candles);
        let histogram = macd_histogram_series(
            &prices,
            self.fast_period,
            self.slow_period,
            self.signal_period,
        );

        let (Some(histogram), Some(ema), Some(&close)) = (
            last_three(&histogram),
            calculate_ema(&prices, self.ema_period),
            prices.last(),
        ) else {
            return Signal::None;
        };

        tracing::debug!(
            "MACD hist {:.5} / {:.5} / {:.5}, close={:.4}, EMA{}={:.4}",
            histogram[0],
            histogram[1],
            histogram[2],
            close,
            self.ema_period,
            ema
        );

        self.decide(histogram, close, ema)
    }

    fn name(&self) -> &str {
        "MacdEma"
    }

    fn min_candles_required(&self) -> usize {
        let macd_needed = macd_warmup(self.slow_period, self.signal_period) + 2;
        (self.ema_period + 2).max(macd_needed)
    }
}
