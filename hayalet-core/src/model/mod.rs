//! Shared data types used across every module: ticks, positions, account
//! state, commands, and the per-symbol/per-account state the engine keeps
//! between ticks.

use std::fmt;
use std::time::SystemTime;

/// Trading direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A trading command sent to the terminal (or interpreted internally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CommandType {
    Open,
    Close,
    Modify,
    Pause,
    Resume,
    HedgeAll,
    CloseAll,
    Freeze,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandType::Open => "OPEN",
            CommandType::Close => "CLOSE",
            CommandType::Modify => "MODIFY",
            CommandType::Pause => "PAUSE",
            CommandType::Resume => "RESUME",
            CommandType::HedgeAll => "HEDGE_ALL",
            CommandType::CloseAll => "CLOSE_ALL",
            CommandType::Freeze => "FREEZE",
        };
        write!(f, "{s}")
    }
}

/// Balance Guard protection level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum GuardLevel {
    Green,
    Yellow,
    Orange,
    Red,
    Black,
}

impl fmt::Display for GuardLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GuardLevel::Green => "GREEN",
            GuardLevel::Yellow => "YELLOW",
            GuardLevel::Orange => "ORANGE",
            GuardLevel::Red => "RED",
            GuardLevel::Black => "BLACK",
        };
        write!(f, "{s}")
    }
}

/// Classification produced by the market detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MarketState {
    Range,
    Trend,
    Volatile,
}

/// Engine run mode, surfaced in the status projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EngineMode {
    Running,
    Paused,
    Frozen,
}

/// Direction hint passed from scoring into the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionHint {
    Both,
    BuyOnly,
    SellOnly,
}

/// A single bid/ask observation for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Tick {
    pub symbol: [u8; 16],
    pub bid: f64,
    pub ask: f64,
    pub time: SystemTime,
}

impl Tick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn symbol_str(&self) -> String {
        decode_fixed(&self.symbol)
    }
}

/// An open market exposure, or a pending limit/stop order when `pending`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Position {
    pub id: i64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub open_time: SystemTime,
    pub magic: i32,
    pub account_id: String,
    pub pending: bool,
    pub profit_loss: f64,
    pub swap: f64,
    pub comment: String,
}

/// Snapshot of a trading account's equity/margin/drawdown state.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AccountState {
    pub account_id: String,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub margin_level: f64,
    pub peak_equity: f64,
    pub drawdown_pct: f64,
    pub guard_level: GuardLevel,
    pub time: SystemTime,
}

impl AccountState {
    /// Recompute `drawdownPct` from `peakEquity`/`equity`, per §3's invariant.
    pub fn recompute_drawdown(&mut self) {
        self.drawdown_pct = if self.peak_equity > 0.0 {
            (0.0_f64).max((self.peak_equity - self.equity) / self.peak_equity * 100.0)
        } else {
            0.0
        };
    }
}

/// A command emitted by the pipeline or received from the projection.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Command {
    pub kind: CommandType,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub tp: f64,
    pub sl: f64,
    pub ticket: i64,
    pub magic: i32,
    pub account_id: String,
    pub reason: String,
    pub time: SystemTime,
}

/// Per (account, symbol) grid ladder state.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GridState {
    pub active: bool,
    pub direction: Side,
    pub anchor_price: f64,
    pub current_level: i32,
    pub max_level: i32,
    pub total_lots: f64,
    pub floating_pl: f64,
    pub created_at: SystemTime,
}

impl GridState {
    pub fn unset(now: SystemTime) -> Self {
        GridState {
            active: false,
            direction: Side::Buy,
            anchor_price: 0.0,
            current_level: 0,
            max_level: 0,
            total_lots: 0.0,
            floating_pl: 0.0,
            created_at: now,
        }
    }
}

/// A single cascade reinforcement level (R1-R6).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CascadeLevel {
    pub level: i32,
    pub price: f64,
    pub triggered: bool,
    pub tp_price: f64,
    pub tp_hit: bool,
}

/// Output of the composite indicator scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ScoringResult {
    pub composite_score: f64,
    pub rsi_score: f64,
    pub macd_score: f64,
    pub bb_score: f64,
    pub ma_score: f64,
    pub stoch_score: f64,
    pub adx_score: f64,
    pub direction: Option<Side>,
}

/// A group of positions selected for portfolio-level smart close.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SmartCloseGroup {
    pub positions: Vec<i64>,
    pub net_pl: f64,
}

/// Per-symbol ATR-ratio consolidation state.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ConsolidationState {
    pub current_atr: f64,
    pub average_atr: f64,
    pub atr_ratio: f64,
    pub is_consolidating: bool,
}

/// Encode a `&str` into a fixed-width NUL-padded byte array, truncating if
/// the source is longer than `N`.
pub fn encode_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

/// Decode a fixed-width NUL-padded byte array back into a `String`,
/// stopping at the first NUL byte.
pub fn decode_fixed(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_string_round_trip() {
        let buf: [u8; 16] = encode_fixed("EURUSD");
        assert_eq!(decode_fixed(&buf), "EURUSD");
    }

    #[test]
    fn fixed_string_truncates() {
        let buf: [u8; 4] = encode_fixed("EURUSD");
        assert_eq!(decode_fixed(&buf), "EURU");
    }

    #[test]
    fn drawdown_zero_when_no_peak() {
        let mut acct = AccountState {
            account_id: "ACC1".into(),
            balance: 0.0,
            equity: 100.0,
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 0.0,
            drawdown_pct: 0.0,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        };
        acct.recompute_drawdown();
        assert_eq!(acct.drawdown_pct, 0.0);
    }

    #[test]
    fn drawdown_nonnegative() {
        let mut acct = AccountState {
            account_id: "ACC1".into(),
            balance: 0.0,
            equity: 9000.0,
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 10000.0,
            drawdown_pct: 0.0,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        };
        acct.recompute_drawdown();
        assert!((acct.drawdown_pct - 10.0).abs() < 1e-9);
    }
}
