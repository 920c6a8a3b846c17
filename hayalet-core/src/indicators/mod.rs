//! Pure indicator functions over tick mid-price series.
//!
//! Grounded on the helper functions in the Go original's
//! `internal/engine/scoring.go` and `internal/engine/market.go` (`sma`,
//! `ema`, `stdDev`, the RSI/MACD/Bollinger/Stochastic/ADX bodies), split
//! out here as the raw, reusable indicator layer the spec calls C4 —
//! the scoring thresholds that turn these into a directional bias live
//! in [`crate::scoring`].

use crate::model::Tick;

pub fn mids(ticks: &[Tick]) -> Vec<f64> {
    ticks.iter().map(|t| t.mid()).collect()
}

/// Simple moving average over the whole slice. 0 on empty input.
pub fn sma(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn stdev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = sma(values);
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// EMA(period) seeded with SMA of the first `period` values, per spec §4.4.
pub fn ema(data: &[f64], period: usize) -> f64 {
    if data.len() < period || period == 0 {
        return 0.0;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut e = sma(&data[..period]);
    for &v in &data[period..] {
        e = v * k + e * (1.0 - k);
    }
    e
}

/// RSI(14) on simple (non-Wilder) averages of gains/losses over the last
/// `period` deltas. Returns 0 on insufficient data, 100 when there were no
/// losses in the window.
pub fn rsi(mids: &[f64], period: usize) -> f64 {
    let n = mids.len();
    if n < period + 1 {
        return 0.0;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in n - period..n {
        let diff = mids[i] - mids[i - 1];
        if diff > 0.0 {
            gains += diff;
        } else {
            losses += diff.abs();
        }
    }
    if losses == 0.0 {
        return 100.0;
    }
    let rs = (gains / period as f64) / (losses / period as f64);
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD(fast, slow, signal) line/signal/histogram, computed by re-running
/// the EMA over each growing window to build the signal's input series
/// (matches the Go original's `macdHistory`).
pub fn macd(mids: &[f64], fast: usize, slow: usize, signal_period: usize) -> (f64, f64, f64) {
    if mids.len() < slow {
        return (0.0, 0.0, 0.0);
    }
    let line = ema(mids, fast) - ema(mids, slow);
    let mut history = Vec::new();
    for i in slow..=mids.len() {
        let window = &mids[..i];
        history.push(ema(window, fast) - ema(window, slow));
    }
    let signal = ema(&history, signal_period);
    (line, signal, line - signal)
}

/// Bollinger bands over `period` values at `deviation` standard deviations:
/// returns (upper, lower, percent-B in 0..100, or 0 if bands collapse).
pub fn bollinger(mids: &[f64], period: usize, deviation: f64) -> (f64, f64, f64) {
    let n = mids.len();
    if n < period {
        return (0.0, 0.0, 0.0);
    }
    let recent = &mids[n - period..];
    let mean = sma(recent);
    let sd = stdev(recent);
    let upper = mean + deviation * sd;
    let lower = mean - deviation * sd;
    if upper == lower {
        return (upper, lower, 0.0);
    }
    let current = mids[n - 1];
    let pct_b = (current - lower) / (upper - lower) * 100.0;
    (upper, lower, pct_b)
}

/// Stochastic %K over `period`. 0 on insufficient data or collapsed range.
pub fn stochastic(mids: &[f64], period: usize) -> f64 {
    let n = mids.len();
    if n < period {
        return 0.0;
    }
    let recent = &mids[n - period..];
    let high = recent.iter().cloned().fold(f64::MIN, f64::max);
    let low = recent.iter().cloned().fold(f64::MAX, f64::min);
    if high == low {
        return 0.0;
    }
    (mids[n - 1] - low) / (high - low) * 100.0
}

/// Simplified ADX: `|ΣΔ+ - ΣΔ-| / (ΣΔ+ + ΣΔ-) · 100` over the last `period`
/// deltas (spec §4.4/§9 — a fixed-window sum-of-directional-movements
/// approximation, not smoothed DMI).
pub fn simplified_adx(mids: &[f64], period: usize) -> f64 {
    let n = mids.len();
    if n < period + 1 {
        return 0.0;
    }
    let mut plus_dm = 0.0;
    let mut minus_dm = 0.0;
    for i in n - period..n {
        let diff = mids[i] - mids[i - 1];
        if diff > 0.0 {
            plus_dm += diff;
        } else {
            minus_dm += diff.abs();
        }
    }
    let total = plus_dm + minus_dm;
    if total == 0.0 {
        return 0.0;
    }
    (plus_dm - minus_dm).abs() / total * 100.0
}

/// Directional components (DI+, DI-, DX) needed by the ADX score (§4.6),
/// shared with [`simplified_adx`]'s window logic.
pub fn directional_movement(mids: &[f64], period: usize) -> (f64, f64, f64) {
    let n = mids.len();
    if n < period + 1 {
        return (0.0, 0.0, 0.0);
    }
    let mut plus_dm = 0.0;
    let mut minus_dm = 0.0;
    for i in n - period..n {
        let diff = mids[i] - mids[i - 1];
        if diff > 0.0 {
            plus_dm += diff;
        } else {
            minus_dm += diff.abs();
        }
    }
    let total = plus_dm + minus_dm;
    if total == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let di_plus = plus_dm / total * 100.0;
    let di_minus = minus_dm / total * 100.0;
    let dx = (di_plus - di_minus).abs() / (di_plus + di_minus) * 100.0;
    (di_plus, di_minus, dx)
}

/// True-range series: `TRi = max(ask_i-bid_i, |ask_i-mid_{i-1}|, |bid_i-mid_{i-1}|)`.
pub fn true_range_series(ticks: &[Tick]) -> Vec<f64> {
    let mut out = Vec::with_capacity(ticks.len().saturating_sub(1));
    for i in 1..ticks.len() {
        let prev_mid = ticks[i - 1].mid();
        let cur_high = ticks[i].ask;
        let cur_low = ticks[i].bid;
        let tr = (cur_high - cur_low)
            .max((cur_high - prev_mid).abs())
            .max((cur_low - prev_mid).abs());
        out.push(tr);
    }
    out
}

/// Current ATR (average of the last `period` true ranges) and the average
/// ATR over `min(50, available)` true ranges, per spec §4.5.
pub fn atr(ticks: &[Tick], period: usize) -> (f64, f64) {
    let tr = true_range_series(ticks);
    if tr.len() < period {
        return (0.0, 0.0);
    }
    let current = sma(&tr[tr.len() - period..]);
    let lookback = tr.len().min(50);
    let average = sma(&tr[tr.len() - lookback..]);
    (current, average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn tick(bid: f64, ask: f64) -> Tick {
        Tick {
            symbol: crate::model::encode_fixed("EURUSD"),
            bid,
            ask,
            time: SystemTime::now(),
        }
    }

    #[test]
    fn sma_of_constant_series() {
        assert_eq!(sma(&[1.0, 1.0, 1.0]), 1.0);
    }

    #[test]
    fn rsi_insufficient_data_is_zero() {
        assert_eq!(rsi(&[1.0, 2.0], 14), 0.0);
    }

    #[test]
    fn rsi_all_gains_saturates_high() {
        let mids: Vec<f64> = (0..15).map(|i| 1.0 + i as f64 * 0.01).collect();
        assert_eq!(rsi(&mids, 14), 100.0);
    }

    #[test]
    fn bollinger_collapsed_range_is_zero() {
        let mids = vec![1.0; 25];
        let (_, _, pct_b) = bollinger(&mids, 20, 2.0);
        assert_eq!(pct_b, 0.0);
    }

    #[test]
    fn atr_insufficient_data_is_zero() {
        let ticks = vec![tick(1.0, 1.0001), tick(1.0, 1.0001)];
        let (cur, avg) = atr(&ticks, 14);
        assert_eq!(cur, 0.0);
        assert_eq!(avg, 0.0);
    }
}
