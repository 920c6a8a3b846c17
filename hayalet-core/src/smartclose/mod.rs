//! Priority-ordered position closing: emergency stop-loss, portfolio
//! take-profit, and the worst-position + profitable-group pairing.
//!
//! Grounded on `internal/engine/smartclose.go`'s `SmartClose.Evaluate` and
//! its `findWorstPosition`/`findBestGroup` helpers.

use tracing::{info, warn};

use crate::model::{AccountState, Command, CommandType, Position, SmartCloseGroup};

/// Tunable thresholds for one account's smart-close policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmartCloseConfig {
    pub min_pnl: f64,
    pub min_dd: f64,
    pub max_sl: f64,
    pub single_tp: f64,
    pub group_tp: f64,
    pub portfolio_tp: f64,
}

impl Default for SmartCloseConfig {
    fn default() -> Self {
        SmartCloseConfig {
            min_pnl: 1.0,
            min_dd: 10.0,
            max_sl: 500.0,
            single_tp: 0.50,
            group_tp: 3.00,
            portfolio_tp: 5.00,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SmartCloseResult {
    pub should_close: bool,
    pub commands: Vec<Command>,
    pub groups: Vec<SmartCloseGroup>,
    pub reason: String,
}

fn close_command(pos: &Position, account_id: &str, reason: &str, now: std::time::SystemTime) -> Command {
    Command {
        kind: CommandType::Close,
        symbol: pos.symbol.clone(),
        side: pos.side,
        volume: pos.volume,
        price: 0.0,
        tp: 0.0,
        sl: 0.0,
        ticket: pos.id,
        magic: pos.magic,
        account_id: account_id.to_string(),
        reason: reason.to_string(),
        time: now,
    }
}

fn total_profit_loss(positions: &[Position]) -> f64 {
    let total: f64 = positions.iter().filter(|p| !p.pending).map(|p| p.profit_loss).sum();
    (total * 100.0).round() / 100.0
}

fn close_all(positions: &[Position], account_id: &str, reason: &str, now: std::time::SystemTime) -> Vec<Command> {
    positions
        .iter()
        .filter(|p| !p.pending)
        .map(|p| close_command(p, account_id, reason, now))
        .collect()
}

/// Most-negative-P&L position, ties broken by smaller id (spec §4.8.4).
fn find_worst(positions: &[Position]) -> Option<&Position> {
    positions
        .iter()
        .filter(|p| !p.pending)
        .min_by(|a, b| {
            a.profit_loss
                .partial_cmp(&b.profit_loss)
                .unwrap()
                .then(a.id.cmp(&b.id))
        })
}

/// Greedily accumulate profitable positions (P&L descending) until
/// `group_net + worst_pl >= min_net_pl`; `None` if the full profitable set
/// can't reach the threshold (spec §4.8.4).
fn find_best_group(positions: &[Position], worst: &Position, min_net_pl: f64) -> Option<SmartCloseGroup> {
    let mut profitable: Vec<&Position> = positions
        .iter()
        .filter(|p| p.id != worst.id && !p.pending && p.profit_loss > 0.0)
        .collect();
    if profitable.is_empty() {
        return None;
    }
    profitable.sort_by(|a, b| b.profit_loss.partial_cmp(&a.profit_loss).unwrap());

    let mut group_pl = 0.0;
    let mut ids = Vec::new();
    for pos in profitable {
        group_pl += pos.profit_loss;
        ids.push(pos.id);
        let net_pl = group_pl + worst.profit_loss;
        if net_pl >= min_net_pl {
            return Some(SmartCloseGroup { positions: ids, net_pl });
        }
    }
    None
}

/// Evaluate the priority-ordered smart-close checks for one account
/// snapshot (spec §4.8): emergency stop, portfolio TP, then worst+group.
pub fn evaluate(
    cfg: &SmartCloseConfig,
    positions: &[Position],
    acct: &AccountState,
    now: std::time::SystemTime,
) -> SmartCloseResult {
    if positions.is_empty() {
        return SmartCloseResult::default();
    }

    let total_pl = total_profit_loss(positions);

    if cfg.max_sl > 0.0 && total_pl <= -cfg.max_sl {
        warn!(total_pl, max_sl = cfg.max_sl, "emergency_close");
        return SmartCloseResult {
            should_close: true,
            commands: close_all(positions, &acct.account_id, "EMERGENCY_MAX_LOSS", now),
            groups: Vec::new(),
            reason: "EMERGENCY_MAX_LOSS".into(),
        };
    }

    if cfg.portfolio_tp > 0.0 && total_pl >= cfg.portfolio_tp {
        info!(total_pl, portfolio_tp = cfg.portfolio_tp, "portfolio_tp_hit");
        return SmartCloseResult {
            should_close: true,
            commands: close_all(positions, &acct.account_id, "PORTFOLIO_TP", now),
            groups: Vec::new(),
            reason: "PORTFOLIO_TP".into(),
        };
    }

    if acct.drawdown_pct < cfg.min_dd {
        return SmartCloseResult::default();
    }

    let Some(worst) = find_worst(positions) else {
        return SmartCloseResult::default();
    };
    if worst.profit_loss >= 0.0 {
        return SmartCloseResult::default();
    }
    let worst = worst.clone();

    let Some(group) = find_best_group(positions, &worst, cfg.min_pnl) else {
        return SmartCloseResult::default();
    };

    let mut commands = vec![close_command(&worst, &acct.account_id, "SMART_CLOSE_WORST", now)];
    for id in &group.positions {
        if let Some(pos) = positions.iter().find(|p| p.id == *id) {
            commands.push(close_command(pos, &acct.account_id, "SMART_CLOSE_GROUP", now));
        }
    }

    info!(
        worst_pl = worst.profit_loss,
        group_pl = group.net_pl - worst.profit_loss,
        net_pl = group.net_pl,
        "smart_close_triggered"
    );

    SmartCloseResult {
        should_close: true,
        commands,
        groups: vec![group],
        reason: "SMART_CLOSE".into(),
    }
}

/// Single-position TP sweep (spec §4.8 "secondary utilities").
pub fn check_single_tp(
    cfg: &SmartCloseConfig,
    positions: &[Position],
    account_id: &str,
    now: std::time::SystemTime,
) -> Vec<Command> {
    positions
        .iter()
        .filter(|p| !p.pending && p.profit_loss >= cfg.single_tp)
        .map(|p| close_command(p, account_id, "SINGLE_TP", now))
        .collect()
}

/// Symbol×side group TP sweep (spec §4.8 "secondary utilities").
pub fn check_group_tp(
    cfg: &SmartCloseConfig,
    positions: &[Position],
    account_id: &str,
    now: std::time::SystemTime,
) -> Vec<Command> {
    use std::collections::HashMap;
    let mut groups: HashMap<(String, crate::model::Side), Vec<&Position>> = HashMap::new();
    for pos in positions.iter().filter(|p| !p.pending) {
        groups.entry((pos.symbol.clone(), pos.side)).or_default().push(pos);
    }

    let mut commands = Vec::new();
    for members in groups.values() {
        let group_pl: f64 = members.iter().map(|p| p.profit_loss).sum();
        if group_pl >= cfg.group_tp {
            for pos in members {
                commands.push(close_command(pos, account_id, "GROUP_TP", now));
            }
        }
    }
    commands
}
