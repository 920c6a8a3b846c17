//! Progressive reinforcement levels (R1-R6) layered on top of a grid
//! anchor, one cascade per (account, symbol).
//!
//! Grounded on `internal/engine/cascade.go`'s `CascadeEngine`/
//! `CascadeManager`. Per spec §9's Open Question, `is_tp_hit` intentionally
//! preserves the original's behavior of checking for *any* BUY/SELL
//! position across the whole passed-in slice rather than filtering by this
//! level's magic range first — not silently corrected.

use std::collections::HashMap;
use std::time::SystemTime;

use tracing::info;

use crate::grid::pip_size;
use crate::guard::GuardResult;
use crate::model::{CascadeLevel, Command, CommandType, Position, Side};

const MIN_DEPTH: i32 = 1;
const MAX_DEPTH: i32 = 6;

/// Parameters shared between grid and cascade order sizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeParams {
    pub base_lot: f64,
    pub lot_multiplier: f64,
    pub direction: Side,
}

fn magic_range(level: i32) -> (i32, i32) {
    let start = 1000 + level * 100;
    (start, start + 99)
}

/// A single (account, symbol) cascade ladder.
pub struct CascadeEngine {
    symbol: String,
    account_id: String,
    levels: Vec<CascadeLevel>,
}

impl CascadeEngine {
    pub fn new(symbol: impl Into<String>, account_id: impl Into<String>, max_depth: i32) -> Self {
        let depth = max_depth.clamp(MIN_DEPTH, MAX_DEPTH);
        let levels = (1..=depth)
            .map(|i| CascadeLevel {
                level: i,
                price: 0.0,
                triggered: false,
                tp_price: 0.0,
                tp_hit: false,
            })
            .collect();
        CascadeEngine {
            symbol: symbol.into(),
            account_id: account_id.into(),
            levels,
        }
    }

    pub fn levels(&self) -> &[CascadeLevel] {
        &self.levels
    }

    /// Set each level's trigger price and TP price from an anchor and base
    /// spacing (spec §4.10). TP widens with depth: `tpMultiplier = 1 + (i-1)*0.5`.
    pub fn initialize(&mut self, anchor_price: f64, spacing: f64, side: Side) {
        let pip = pip_size(&self.symbol);
        for lvl in &mut self.levels {
            let i = lvl.level as f64;
            let depth = i * spacing * pip;
            lvl.price = match side {
                Side::Buy => anchor_price - depth,
                Side::Sell => anchor_price + depth,
            };
            let tp_multiplier = 1.0 + (i - 1.0) * 0.5;
            let tp_offset = spacing * tp_multiplier * pip;
            lvl.tp_price = match side {
                Side::Buy => lvl.price + tp_offset,
                Side::Sell => lvl.price - tp_offset,
            };
            lvl.triggered = false;
            lvl.tp_hit = false;
        }
    }

    fn is_triggered(&self, level: &CascadeLevel, mid: f64) -> bool {
        let tolerance = pip_size(&self.symbol) * 2.0;
        (mid - level.price).abs() <= tolerance
    }

    fn is_tp_hit(level: &CascadeLevel, mid: f64, positions: &[Position]) -> bool {
        let has_buy = positions.iter().any(|p| p.side == Side::Buy);
        let has_sell = positions.iter().any(|p| p.side == Side::Sell);
        (has_buy && mid >= level.tp_price) || (has_sell && mid <= level.tp_price)
    }

    fn build_cascade_order(&self, level: &CascadeLevel, params: &CascadeParams, guard: &GuardResult, bid: f64, ask: f64, now: SystemTime) -> Option<Command> {
        let mut lot = params.base_lot * params.lot_multiplier.powi(level.level - 1);
        lot *= guard.lot_scale;
        lot = (lot * 100.0).round() / 100.0;
        if lot < 0.01 {
            return None;
        }
        let side = params.direction;
        let price = if side == Side::Sell { bid } else { ask };
        let magic = 1000 + level.level * 100;

        Some(Command {
            kind: CommandType::Open,
            symbol: self.symbol.clone(),
            side,
            volume: lot,
            price,
            tp: level.tp_price,
            sl: 0.0,
            ticket: 0,
            magic,
            account_id: self.account_id.clone(),
            reason: format!("CASCADE_R{}", level.level),
            time: now,
        })
    }

    fn build_cascade_close(&self, level: &CascadeLevel, positions: &[Position], now: SystemTime) -> Vec<Command> {
        let (start, end) = magic_range(level.level);
        positions
            .iter()
            .filter(|p| p.magic >= start && p.magic <= end)
            .map(|p| Command {
                kind: CommandType::Close,
                symbol: self.symbol.clone(),
                side: p.side,
                volume: p.volume,
                price: 0.0,
                tp: 0.0,
                sl: 0.0,
                ticket: p.id,
                magic: p.magic,
                account_id: self.account_id.clone(),
                reason: format!("CASCADE_R{}_TP", level.level),
                time: now,
            })
            .collect()
    }

    /// Evaluate all levels for one tick (spec §4.10). No-op if the guard
    /// currently forbids cascade entries.
    pub fn evaluate(&mut self, bid: f64, ask: f64, positions: &[Position], guard: &GuardResult, params: &CascadeParams, now: SystemTime) -> Vec<Command> {
        if !guard.allow_cascade {
            return Vec::new();
        }
        let mid = (bid + ask) / 2.0;
        let mut cmds = Vec::new();

        for idx in 0..self.levels.len() {
            let level = self.levels[idx];
            if level.triggered {
                if !level.tp_hit && Self::is_tp_hit(&level, mid, positions) {
                    self.levels[idx].tp_hit = true;
                    let close_cmds = self.build_cascade_close(&level, positions, now);
                    info!(symbol = %self.symbol, level = level.level, tp_price = level.tp_price, "cascade_tp_hit");
                    cmds.extend(close_cmds);
                }
                continue;
            }
            if self.is_triggered(&level, mid) {
                self.levels[idx].triggered = true;
                info!(symbol = %self.symbol, level = level.level, price = level.price, "cascade_triggered");
                if let Some(cmd) = self.build_cascade_order(&level, params, guard, bid, ask, now) {
                    cmds.push(cmd);
                }
            }
        }
        cmds
    }

    pub fn reset(&mut self) {
        for lvl in &mut self.levels {
            lvl.triggered = false;
            lvl.tp_hit = false;
        }
    }
}

/// Owns one [`CascadeEngine`] per (account, symbol).
pub struct CascadeManager {
    cascades: HashMap<(String, String), CascadeEngine>,
}

impl CascadeManager {
    pub fn new() -> Self {
        CascadeManager { cascades: HashMap::new() }
    }

    pub fn get_or_create(&mut self, account_id: &str, symbol: &str, max_depth: i32) -> &mut CascadeEngine {
        self.cascades
            .entry((account_id.to_string(), symbol.to_string()))
            .or_insert_with(|| CascadeEngine::new(symbol, account_id, max_depth))
    }

    pub fn get(&self, account_id: &str, symbol: &str) -> Option<&CascadeEngine> {
        self.cascades.get(&(account_id.to_string(), symbol.to_string()))
    }
}

impl Default for CascadeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn pos(id: i64, magic: i32, side: Side) -> Position {
        Position {
            id,
            symbol: "EURUSD".into(),
            side,
            volume: 0.01,
            price: 1.1,
            open_time: SystemTime::now(),
            magic,
            account_id: "ACC1".into(),
            pending: false,
            profit_loss: 0.0,
            swap: 0.0,
            comment: String::new(),
        }
    }

    #[test]
    fn depth_clamped_to_six() {
        let engine = CascadeEngine::new("EURUSD", "ACC1", 10);
        assert_eq!(engine.levels().len(), 6);
    }

    #[test]
    fn depth_clamped_to_one_minimum() {
        let engine = CascadeEngine::new("EURUSD", "ACC1", 0);
        assert_eq!(engine.levels().len(), 1);
    }

    #[test]
    fn r1_triggers_on_price_reaching_level() {
        let mut engine = CascadeEngine::new("EURUSD", "ACC1", 3);
        engine.initialize(1.1000, 10.0, Side::Buy);
        let level1_price = engine.levels()[0].price;
        let guard = GuardResult { allow_cascade: true, ..GuardResult::default() };
        let params = CascadeParams { base_lot: 0.01, lot_multiplier: 1.5, direction: Side::Buy };
        let cmds = engine.evaluate(level1_price, level1_price + 0.0002, &[], &guard, &params, SystemTime::now());
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].reason, "CASCADE_R1");
        assert!(engine.levels()[0].triggered);
    }

    #[test]
    fn cascade_disallowed_by_guard_is_noop() {
        let mut engine = CascadeEngine::new("EURUSD", "ACC1", 3);
        engine.initialize(1.1000, 10.0, Side::Buy);
        let guard = GuardResult { allow_cascade: false, ..GuardResult::default() };
        let params = CascadeParams { base_lot: 0.01, lot_multiplier: 1.5, direction: Side::Buy };
        let level1_price = engine.levels()[0].price;
        let cmds = engine.evaluate(level1_price, level1_price, &[], &guard, &params, SystemTime::now());
        assert!(cmds.is_empty());
    }

    #[test]
    fn tp_hit_closes_positions_in_magic_range() {
        let mut engine = CascadeEngine::new("EURUSD", "ACC1", 2);
        engine.initialize(1.1000, 10.0, Side::Buy);
        let guard = GuardResult { allow_cascade: true, ..GuardResult::default() };
        let params = CascadeParams { base_lot: 0.01, lot_multiplier: 1.5, direction: Side::Buy };
        let level1_price = engine.levels()[0].price;
        engine.evaluate(level1_price, level1_price, &[], &guard, &params, SystemTime::now());
        assert!(engine.levels()[0].triggered);

        let tp_price = engine.levels()[0].tp_price;
        let positions = vec![pos(1, 1100, Side::Buy)];
        let cmds = engine.evaluate(tp_price, tp_price, &positions, &guard, &params, SystemTime::now());
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].reason, "CASCADE_R1_TP");
        assert!(engine.levels()[0].tp_hit);
    }
}
