//! Balance Guard: maps an account's drawdown to a discrete protection level.
//!
//! Grounded on `internal/engine/guard.go`'s `Guard.Evaluate`, translated to
//! a pure function of (levels, drawdown) plus a small stateful wrapper that
//! only tracks the previous level in order to log transitions.

use tracing::warn;

use crate::config::DrawdownLevel;
use crate::model::{AccountState, GuardLevel};

/// Output of a single guard evaluation (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardResult {
    pub level: GuardLevel,
    pub max_grid_level: i32,
    pub lot_scale: f64,
    pub allow_cascade: bool,
    pub allow_stealth: bool,
    pub force_hedge: bool,
    pub force_close: bool,
}

impl Default for GuardResult {
    fn default() -> Self {
        GuardResult {
            level: GuardLevel::Green,
            max_grid_level: 100,
            lot_scale: 1.0,
            allow_cascade: true,
            allow_stealth: true,
            force_hedge: false,
            force_close: false,
        }
    }
}

fn level_from_name(name: &str) -> GuardLevel {
    match name {
        "YELLOW" => GuardLevel::Yellow,
        "ORANGE" => GuardLevel::Orange,
        "RED" => GuardLevel::Red,
        "BLACK" => GuardLevel::Black,
        _ => GuardLevel::Green,
    }
}

/// Evaluate the guard level for one account snapshot against an ordered
/// list of drawdown levels, traversed from highest threshold downward; the
/// first level whose threshold is at most the current drawdown wins. Pure
/// function of its inputs — no hysteresis beyond what the threshold
/// ordering itself encodes (spec §4.7).
pub fn evaluate(levels: &[DrawdownLevel], acct: &AccountState) -> GuardResult {
    let dd = acct.drawdown_pct;
    for lvl in levels.iter().rev() {
        if dd >= lvl.threshold_percent {
            return GuardResult {
                level: level_from_name(&lvl.name),
                max_grid_level: lvl.max_grid_level,
                lot_scale: lvl.lot_scale,
                allow_cascade: lvl.allow_cascade,
                allow_stealth: lvl.allow_stealth,
                force_hedge: lvl.force_hedge,
                force_close: lvl.force_close,
            };
        }
    }
    GuardResult::default()
}

/// Stateful wrapper around [`evaluate`] that logs level transitions
/// (spec §4.7's "state machine: level transitions are logged").
pub struct Guard {
    levels: Vec<DrawdownLevel>,
    prev: GuardLevel,
}

impl Guard {
    pub fn new(levels: Vec<DrawdownLevel>) -> Self {
        Guard {
            levels,
            prev: GuardLevel::Green,
        }
    }

    pub fn evaluate(&mut self, acct: &AccountState) -> GuardResult {
        let result = evaluate(&self.levels, acct);
        if result.level != self.prev {
            warn!(
                account = %acct.account_id,
                from = %self.prev,
                to = %result.level,
                drawdown_pct = acct.drawdown_pct,
                "guard_level_changed"
            );
            self.prev = result.level;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_levels;
    use std::time::SystemTime;

    fn acct(drawdown_pct: f64) -> AccountState {
        AccountState {
            account_id: "ACC1".into(),
            balance: 10000.0,
            equity: 10000.0 * (1.0 - drawdown_pct / 100.0),
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 10000.0,
            drawdown_pct,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        }
    }

    #[test]
    fn no_drawdown_is_green_default() {
        let levels = default_levels();
        let result = evaluate(&levels, &acct(0.0));
        assert_eq!(result, GuardResult::default());
    }

    #[test]
    fn high_drawdown_forces_close() {
        let levels = default_levels();
        let result = evaluate(&levels, &acct(45.0));
        assert_eq!(result.level, GuardLevel::Black);
        assert!(result.force_close);
    }

    #[test]
    fn mid_drawdown_forces_hedge_and_blocks_cascade() {
        let levels = default_levels();
        let result = evaluate(&levels, &acct(32.0));
        assert_eq!(result.level, GuardLevel::Red);
        assert!(result.force_hedge);
        assert!(!result.allow_cascade);
    }

    #[test]
    fn evaluate_is_idempotent() {
        let levels = default_levels();
        let first = evaluate(&levels, &acct(25.0));
        let mut acct2 = acct(25.0);
        acct2.guard_level = first.level;
        let second = evaluate(&levels, &acct2);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_levels_defaults_green() {
        let result = evaluate(&[], &acct(80.0));
        assert_eq!(result, GuardResult::default());
    }
}
