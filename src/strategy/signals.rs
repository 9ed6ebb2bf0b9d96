use crate::models::Candle;

/// Closing prices, oldest first
pub fn closing_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Last three values of a series as `[-3, -2, -1]`
pub fn last_three(series: &[f64]) -> Option<[f64; 3]> {
    match series {
        [.., a, b, c] => Some([*a, *b, *c]),
        _ => None,
    }
}

/// `fast` was below `slow` on the two previous candles and is above it now
pub fn crossed_above(fast: [f64; 3], slow: [f64; 3]) -> bool {
    fast[0] < slow[0] && fast[1] < slow[1] && fast[2] > slow[2]
}

/// `fast` was above `slow` on the two previous candles and is below it now
pub fn crossed_below(fast: [f64; 3], slow: [f64; 3]) -> bool {
    fast[0] > slow[0] && fast[1] > slow[1] && fast[2] < slow[2]
}

/// Validate that candles are uniformly spaced in time
///
/// # Arguments
/// * `candles` - The candles to validate
/// * `expected_interval_secs` - Expected time between candles in seconds
///
/// # Returns
/// * `Ok(())` if candles are uniformly spaced (within tolerance)
/// * `Err` if there are gaps in the data
///
/// # Tolerance
/// Allows up to 1.5x the expected interval (venue maintenance can shift a bar slightly)
pub fn validate_candle_uniformity(
    candles: &[Candle],
    expected_interval_secs: u64,
) -> anyhow::Result<()> {
    if candles.len() < 2 {
        return Ok(());
    }

    let max_gap_secs = expected_interval_secs + (expected_interval_secs / 2);

    for window in candles.windows(2) {
        let time_diff = (window[1].open_time - window[0].open_time).num_seconds();

        if time_diff < 0 {
            anyhow::bail!("Candles are not sorted by open time");
        }

        let time_diff_u64 = time_diff as u64;

        if time_diff_u64 > max_gap_secs {
            anyhow::bail!(
                "Data gap detected: {}s between candles (expected ~{}s, max allowed {}s). \
                 Gap from {} to {}.",
                time_diff_u64,
                expected_interval_secs,
                max_gap_secs,
                window[0].open_time.format("%Y-%m-%d %H:%M"),
                window[1].open_time.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

/// Build closed 15-minute candles from a list of closes, the last one ending an hour ago
#[cfg(test)]
pub(crate) fn candles_from_closes(symbol: &str, closes: &[f64]) -> Vec<Candle> {
    use chrono::{Duration, Utc};

    let start = Utc::now() - Duration::hours(1) - Duration::minutes(15 * closes.len() as i64);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            symbol: symbol.to_string(),
            open_time: start + Duration::minutes(15 * i as i64),
            open: close,
            high: close * 1.001,
            low: close * 0.999,
            close,
            volume: 1000.0,
        })
        .collect()
}
