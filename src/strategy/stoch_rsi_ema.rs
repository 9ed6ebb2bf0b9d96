use super::{
    signals::{closing_prices, crossed_above, crossed_below, last_three},
    SignalSource,
};
use crate::indicators::{calculate_ema, calculate_rsi, stoch_rsi_series, StochRsiParams};
use crate::models::{Candle, Signal};

/// RSI + StochRSI + EMA200 composite strategy
///
/// Long setup:
/// - RSI below 40
/// - close above the long EMA (trend filter)
/// - %K oversold (< 20) and crossing above %D on the latest candle
///
/// The short setup mirrors every condition.
#[derive(Debug, Clone)]
pub struct StochRsiEmaStrategy {
    pub rsi_period: usize,
    pub rsi_long_max: f64,
    pub rsi_short_min: f64,
    pub ema_period: usize,
    pub stoch: StochRsiParams,
    pub k_oversold: f64,
    pub k_overbought: f64,
}

impl Default for StochRsiEmaStrategy {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_long_max: 40.0,
            rsi_short_min: 60.0,
            ema_period: 200,
            stoch: StochRsiParams::default(),
            k_oversold: 20.0,
            k_overbought: 80.0,
        }
    }
}

/// Indicator values the decision is made from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochRsiEmaReading {
    pub rsi: f64,
    pub close: f64,
    pub ema: f64,
    pub k: [f64; 3],
    pub d: [f64; 3],
}

impl StochRsiEmaStrategy {
    pub fn decide(&self, reading: &StochRsiEmaReading) -> Signal {
        let current_k = reading.k[2];

        if reading.rsi < self.rsi_long_max
            && reading.close > reading.ema
            && current_k < self.k_oversold
            && crossed_above(reading.k, reading.d)
        {
            return Signal::Up;
        }

        if reading.rsi > self.rsi_short_min
            && reading.close < reading.ema
            && current_k > self.k_overbought
            && crossed_below(reading.k, reading.d)
        {
            return Signal::Down;
        }

        Signal::None
    }

    fn read(&self, prices: &[f64]) -> Option<StochRsiEmaReading> {
        let (k, d) = stoch_rsi_series(prices, self.stoch);

        Some(StochRsiEmaReading {
            rsi: calculate_rsi(prices, self.rsi_period)?,
            close: *prices.last()?,
            ema: calculate_ema(prices, self.ema_period)?,
            k: last_three(&k)?,
            d: last_three(&d)?,
        })
    }
}

impl SignalSource for StochRsiEmaStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles_required() {
            return Signal::None;
        }

        let prices = closing_prices(candles);
        match self.read(&prices) {
            Some(reading) => {
                tracing::debug!(
                    "RSI={:.1}, close={:.4}, EMA{}={:.4}, %K={:.1}, %D={:.1}",
                    reading.rsi,
                    reading.close,
                    self.ema_period,
                    reading.ema,
                    reading.k[2],
                    reading.d[2]
                );
                self.decide(&reading)
            }
            None => Signal::None,
        }
    }

    fn name(&self) -> &str {
        "StochRsiEma"
    }

    fn min_candles_required(&self) -> usize {
        // Two candles past each lookback so the crossover spans three settled values
        (self.ema_period + 2).max(self.stoch.warmup() + 2)
    }
}
