//! Stochastic RSI
//!
//! Applies the stochastic oscillator to RSI values instead of prices:
//! `(rsi - min(rsi, n)) / (max(rsi, n) - min(rsi, n))`, scaled to 0-100.
//! %K is an SMA of that value, %D an SMA of %K.
//!
//! Values:
//! - %K < 20: Oversold
//! - %K > 80: Overbought

use super::moving_average::sma_series;
use super::rsi::rsi_series;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochRsiParams {
    pub rsi_period: usize,
    pub stoch_period: usize,
    pub smooth_k: usize,
    pub smooth_d: usize,
}

impl Default for StochRsiParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            stoch_period: 14,
            smooth_k: 3,
            smooth_d: 3,
        }
    }
}

impl StochRsiParams {
    /// Number of prices needed before the first %D value exists
    pub fn warmup(&self) -> usize {
        self.rsi_period + self.stoch_period + self.smooth_k + self.smooth_d - 2
    }
}

/// %K and %D series, both aligned to the end of `prices` and of equal length
pub fn stoch_rsi_series(prices: &[f64], params: StochRsiParams) -> (Vec<f64>, Vec<f64>) {
    if params.stoch_period == 0 || prices.len() < params.warmup() {
        return (Vec::new(), Vec::new());
    }

    let rsi = rsi_series(prices, params.rsi_period);

    let stoch: Vec<f64> = rsi
        .windows(params.stoch_period)
        .map(|w| {
            let current = w[w.len() - 1];
            let lowest = w.iter().copied().fold(f64::INFINITY, f64::min);
            let highest = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            if highest - lowest == 0.0 {
                50.0 // flat RSI carries no information
            } else {
                (current - lowest) / (highest - lowest) * 100.0
            }
        })
        .collect();

    let k = sma_series(&stoch, params.smooth_k);
    let d = sma_series(&k, params.smooth_d);

    // Trim %K so both lines end on the same candle and have equal length
    let offset = k.len() - d.len();
    (k[offset..].to_vec(), d)
}
