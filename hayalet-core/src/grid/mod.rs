//! Anchored multi-level averaging ladder, one per (account, symbol).
//!
//! Grounded on `internal/engine/grid.go`'s `GridEngine`/`GridManager`.

use std::collections::HashMap;
use std::time::SystemTime;

use tracing::info;

use crate::config::PresetConfig;
use crate::guard::GuardResult;
use crate::model::{Command, CommandType, DirectionHint, GridState, Position, Side};

/// Grid magic numbers occupy `[MAGIC_BASE, MAGIC_BASE + 3999]` (spec §4.9).
pub const MAGIC_BASE: i32 = 1000;
const MAGIC_RANGE_END: i32 = MAGIC_BASE + 3999;

/// `pipSize(symbol)`: JPY-suffixed pairs and a handful of metal/crypto/index
/// prefixes use 0.01; everything else is standard 4-digit forex (spec §4.9).
pub fn pip_size(symbol: &str) -> f64 {
    if symbol.len() >= 6 && &symbol[3..6] == "JPY" {
        return 0.01;
    }
    if symbol.len() >= 3 {
        let prefix3 = &symbol[..3];
        if prefix3 == "BTC" || prefix3 == "ETH" || prefix3 == "XAU" {
            return 0.01;
        }
        if prefix3 == "US3" || prefix3 == "US5" || prefix3 == "NAS" || &symbol[..2] == "SP" {
            return 0.01;
        }
    }
    0.0001
}

fn filter_grid_positions(positions: &[Position]) -> Vec<&Position> {
    positions
        .iter()
        .filter(|p| !p.pending && p.magic >= MAGIC_BASE && p.magic <= MAGIC_RANGE_END)
        .collect()
}

/// A single (account, symbol) grid ladder.
pub struct GridEngine {
    symbol: String,
    account_id: String,
    preset: PresetConfig,
    state: GridState,
}

impl GridEngine {
    pub fn new(symbol: impl Into<String>, account_id: impl Into<String>, preset: PresetConfig, now: SystemTime) -> Self {
        GridEngine {
            symbol: symbol.into(),
            account_id: account_id.into(),
            preset,
            state: GridState::unset(now),
        }
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    pub fn reset_anchor(&mut self, price: f64, now: SystemTime) {
        self.state.anchor_price = price;
        self.state.current_level = 0;
        self.state.created_at = now;
    }

    fn level_to_price(&self, level: i32, spacing: f64, side: Side) -> f64 {
        let offset = level as f64 * spacing * pip_size(&self.symbol);
        match side {
            Side::Buy => self.state.anchor_price - offset,
            Side::Sell => self.state.anchor_price + offset,
        }
    }

    fn price_to_level(&self, price: f64, spacing: f64, side: Side) -> i32 {
        let pip = pip_size(&self.symbol);
        if pip == 0.0 {
            return 0;
        }
        let distance = match side {
            Side::Buy => self.state.anchor_price - price,
            Side::Sell => price - self.state.anchor_price,
        };
        let level = (distance / (spacing * pip)).round() as i32;
        if level < 1 {
            0
        } else {
            level
        }
    }

    fn calculate_lot(&self, level: i32, guard_scale: f64) -> f64 {
        let mut lot = self.preset.base_lot;
        for _ in 1..level {
            lot *= self.preset.lot_multiplier;
        }
        lot *= guard_scale;
        let lot = (lot * 100.0).round() / 100.0;
        if lot < 0.01 {
            0.0
        } else {
            lot
        }
    }

    fn calculate_tp(&self, price: f64, side: Side) -> f64 {
        if self.preset.tp_pips <= 0.0 {
            return 0.0;
        }
        let offset = self.preset.tp_pips * pip_size(&self.symbol);
        match side {
            Side::Buy => price + offset,
            Side::Sell => price - offset,
        }
    }

    fn update_metrics(&mut self, positions: &[&Position]) {
        let mut total_lots = 0.0;
        let mut floating_pl = 0.0;
        let mut max_level = 0;
        for pos in positions {
            total_lots += pos.volume;
            floating_pl += pos.profit_loss;
            let level = self.price_to_level(pos.price, self.preset.grid_spacing, pos.side);
            if level > max_level {
                max_level = level;
            }
        }
        self.state.total_lots = total_lots;
        self.state.floating_pl = floating_pl;
        self.state.current_level = max_level;
    }

    fn check_levels(
        &self,
        mid: f64,
        spacing: f64,
        side: Side,
        existing: &[&Position],
        max_level: i32,
        lot_scale: f64,
        magic_base: i32,
        entry_price: f64,
        now: SystemTime,
    ) -> Vec<Command> {
        let mut occupied: HashMap<i32, bool> = HashMap::new();
        let mut side_count = 0;
        for pos in existing {
            if pos.side == side {
                side_count += 1;
                occupied.insert(self.price_to_level(pos.price, spacing, side), true);
            }
        }
        if side_count >= max_level {
            return Vec::new();
        }

        let mut cmds = Vec::new();
        for level in 1..=max_level {
            if occupied.contains_key(&level) {
                continue;
            }
            let level_price = self.level_to_price(level, spacing, side);
            if (mid - level_price).abs() > spacing * pip_size(&self.symbol) * 0.6 {
                continue;
            }
            let lot = self.calculate_lot(level, lot_scale);
            if lot <= 0.0 {
                continue;
            }
            let magic = magic_base + level + if side == Side::Sell { 500 } else { 0 };
            let tp = self.calculate_tp(entry_price, side);

            info!(symbol = %self.symbol, side = %side, level, lot, price = entry_price, tp, "grid_order");

            cmds.push(Command {
                kind: CommandType::Open,
                symbol: self.symbol.clone(),
                side,
                volume: lot,
                price: entry_price,
                tp,
                sl: 0.0,
                ticket: 0,
                magic,
                account_id: self.account_id.clone(),
                reason: format!("GRID_L{level}"),
                time: now,
            });
        }
        cmds
    }

    /// Evaluate the grid for one tick (spec §4.9). `magic_base` is the
    /// caller-provided grid magic origin (default `MAGIC_BASE`).
    pub fn evaluate(
        &mut self,
        bid: f64,
        ask: f64,
        positions: &[Position],
        guard: &GuardResult,
        direction: DirectionHint,
        magic_base: i32,
        now: SystemTime,
    ) -> Vec<Command> {
        let effective_max = self.preset.max_levels.min(guard.max_grid_level);
        if effective_max <= 0 {
            return Vec::new();
        }

        let grid_positions = filter_grid_positions(positions);
        self.update_metrics(&grid_positions);

        if grid_positions.is_empty() && self.state.anchor_price == 0.0 {
            self.state.anchor_price = (bid + ask) / 2.0;
            self.state.current_level = 0;
            return Vec::new();
        }
        if self.state.anchor_price == 0.0 {
            return Vec::new();
        }

        let mid = (bid + ask) / 2.0;
        let spacing = self.preset.grid_spacing;
        let mut cmds = Vec::new();

        if matches!(direction, DirectionHint::Both | DirectionHint::BuyOnly) {
            cmds.extend(self.check_levels(
                mid, spacing, Side::Buy, &grid_positions, effective_max, guard.lot_scale, magic_base, ask, now,
            ));
        }
        if matches!(direction, DirectionHint::Both | DirectionHint::SellOnly) {
            cmds.extend(self.check_levels(
                mid, spacing, Side::Sell, &grid_positions, effective_max, guard.lot_scale, magic_base, bid, now,
            ));
        }
        cmds
    }
}

/// Owns one [`GridEngine`] per (account, symbol).
pub struct GridManager {
    grids: HashMap<(String, String), GridEngine>,
}

impl GridManager {
    pub fn new() -> Self {
        GridManager { grids: HashMap::new() }
    }

    pub fn get_or_create(&mut self, account_id: &str, symbol: &str, preset: PresetConfig, now: SystemTime) -> &mut GridEngine {
        self.grids
            .entry((account_id.to_string(), symbol.to_string()))
            .or_insert_with(|| GridEngine::new(symbol, account_id, preset, now))
    }

    pub fn get(&self, account_id: &str, symbol: &str) -> Option<&GridEngine> {
        self.grids.get(&(account_id.to_string(), symbol.to_string()))
    }

    pub fn all_states(&self) -> Vec<(String, String, GridState)> {
        let mut out: Vec<_> = self
            .grids
            .iter()
            .map(|((acct, symbol), g)| (acct.clone(), symbol.clone(), g.state()))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }
}

impl Default for GridManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::encode_fixed;

    fn preset() -> PresetConfig {
        PresetConfig {
            name: "default".into(),
            grid_spacing: 10.0,
            max_levels: 5,
            base_lot: 0.01,
            lot_multiplier: 1.5,
            tp_pips: 15.0,
            cascade_levels: 3,
        }
    }

    fn guard_default() -> GuardResult {
        GuardResult::default()
    }

    #[test]
    fn pip_size_jpy() {
        assert_eq!(pip_size("USDJPY"), 0.01);
    }

    #[test]
    fn pip_size_forex_default() {
        assert_eq!(pip_size("EURUSD"), 0.0001);
    }

    #[test]
    fn fresh_anchor_sets_on_first_evaluation() {
        let _ = encode_fixed::<16>("EURUSD");
        let mut grid = GridEngine::new("EURUSD", "ACC1", preset(), SystemTime::now());
        let cmds = grid.evaluate(1.1000, 1.1002, &[], &guard_default(), DirectionHint::Both, MAGIC_BASE, SystemTime::now());
        assert_eq!(grid.state().anchor_price, 1.1001);
        assert!(cmds.is_empty());
    }

    #[test]
    fn triggers_level_one_when_price_reaches_it() {
        let mut grid = GridEngine::new("EURUSD", "ACC1", preset(), SystemTime::now());
        grid.evaluate(1.1000, 1.1002, &[], &guard_default(), DirectionHint::Both, MAGIC_BASE, SystemTime::now());
        let anchor = grid.state().anchor_price;
        let level1_price = anchor - 10.0 * 0.0001;
        let cmds = grid.evaluate(level1_price, level1_price + 0.0002, &[], &guard_default(), DirectionHint::Both, MAGIC_BASE, SystemTime::now());
        assert!(cmds.iter().any(|c| c.reason == "GRID_L1" && c.side == Side::Buy));
    }

    /// Spec's own S1 worked example: the trigger tolerance is in pips, not
    /// raw price, so only level 1 (not also level 2) fires on the second
    /// tick.
    #[test]
    fn s1_fresh_anchor_then_first_buy_level() {
        let preset = PresetConfig {
            name: "s1".into(),
            grid_spacing: 10.0,
            max_levels: 3,
            base_lot: 0.01,
            lot_multiplier: 2.0,
            tp_pips: 20.0,
            cascade_levels: 0,
        };
        let mut grid = GridEngine::new("EURUSD", "ACC1", preset, SystemTime::now());

        let first = grid.evaluate(1.08350, 1.08360, &[], &guard_default(), DirectionHint::Both, MAGIC_BASE, SystemTime::now());
        assert!(first.is_empty());
        assert!((grid.state().anchor_price - 1.08355).abs() < 1e-9);

        let second = grid.evaluate(1.08250, 1.08260, &[], &guard_default(), DirectionHint::Both, MAGIC_BASE, SystemTime::now());
        assert_eq!(second.len(), 1);
        let cmd = &second[0];
        assert_eq!(cmd.reason, "GRID_L1");
        assert_eq!(cmd.side, Side::Buy);
        assert!((cmd.volume - 0.01).abs() < 1e-9);
        assert!((cmd.price - 1.08260).abs() < 1e-9);
        assert!((cmd.tp - 1.08460).abs() < 1e-9);
        assert_eq!(cmd.magic, 1001);
    }

    #[test]
    fn guard_zero_max_level_emits_nothing() {
        let mut grid = GridEngine::new("EURUSD", "ACC1", preset(), SystemTime::now());
        let guard = GuardResult { max_grid_level: 0, ..GuardResult::default() };
        let cmds = grid.evaluate(1.1000, 1.1002, &[], &guard, DirectionHint::Both, MAGIC_BASE, SystemTime::now());
        assert!(cmds.is_empty());
    }
}
