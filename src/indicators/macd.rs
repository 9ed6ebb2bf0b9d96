//! Moving Average Convergence Divergence (MACD)
//!
//! - MACD line = EMA(fast) - EMA(slow)
//! - Signal line = EMA(signal) of the MACD line
//! - Histogram = MACD line - signal line
//!
//! A histogram flipping sign marks a momentum shift.

use super::moving_average::ema_series;

/// Number of prices needed before the first histogram value exists
pub fn macd_warmup(slow: usize, signal: usize) -> usize {
    slow + signal - 1
}

/// MACD histogram series, aligned to the end of `prices`
pub fn macd_histogram_series(prices: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<f64> {
    if fast == 0 || fast >= slow || prices.len() < macd_warmup(slow, signal) {
        return Vec::new();
    }

    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);

    // Both series end at the last price; drop the head of the longer one
    let offset = fast_ema.len() - slow_ema.len();
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .zip(&fast_ema[offset..])
        .map(|(slow, fast)| fast - slow)
        .collect();

    let signal_line = ema_series(&macd_line, signal);
    let offset = macd_line.len() - signal_line.len();

    macd_line[offset..]
        .iter()
        .zip(&signal_line)
        .map(|(macd, signal)| macd - signal)
        .collect()
}
