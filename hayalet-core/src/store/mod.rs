//! Thread-safe snapshot store for ticks, positions, and account state.
//!
//! Backed by a single `parking_lot::RwLock` per the teacher's lock of
//! choice, matching the Go original's single `sync.RWMutex`-guarded
//! `Store` (`internal/engine/store.go`) — see `DESIGN.md` for why this
//! stays one lock rather than splitting into independent maps.

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::model::{AccountState, Position, Tick};

const MAX_TICKS_PER_SYMBOL: usize = 2048;

struct Inner {
    positions: HashMap<(String, String), HashMap<i64, Position>>,
    accounts: HashMap<String, AccountState>,
    ticks: HashMap<String, Vec<Tick>>,
}

/// Summary of a single symbol's latest tick plus live position count,
/// used by the status projection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub has_tick: bool,
    pub position_count: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreSnapshot {
    pub symbols: Vec<SymbolSnapshot>,
    pub accounts: Vec<AccountState>,
    pub positions: Vec<Position>,
}

pub struct Store {
    inner: RwLock<Inner>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            inner: RwLock::new(Inner {
                positions: HashMap::new(),
                accounts: HashMap::new(),
                ticks: HashMap::new(),
            }),
        }
    }

    pub fn add_ticks(&self, list: impl IntoIterator<Item = Tick>) {
        let mut inner = self.inner.write();
        for tick in list {
            let buf = inner.ticks.entry(tick.symbol_str()).or_default();
            buf.push(tick);
            if buf.len() > MAX_TICKS_PER_SYMBOL {
                let excess = buf.len() - MAX_TICKS_PER_SYMBOL;
                buf.drain(0..excess);
            }
        }
    }

    pub fn update_positions(&self, list: impl IntoIterator<Item = Position>) {
        let mut inner = self.inner.write();
        for pos in list {
            let key = (pos.account_id.clone(), pos.symbol.clone());
            inner.positions.entry(key).or_default().insert(pos.id, pos);
        }
    }

    /// Upsert a single account's state, maintaining `peakEquity` and
    /// `drawdownPct` atomically with the write (spec §4.3).
    pub fn set_account(&self, mut state: AccountState) {
        let mut inner = self.inner.write();
        apply_peak_equity(&inner.accounts, &mut state);
        inner.accounts.insert(state.account_id.clone(), state);
    }

    pub fn update_accounts(&self, list: impl IntoIterator<Item = AccountState>) {
        let mut inner = self.inner.write();
        for mut state in list {
            apply_peak_equity(&inner.accounts, &mut state);
            inner.accounts.insert(state.account_id.clone(), state);
        }
    }

    pub fn get_positions(&self, account_id: &str, symbol: &str) -> Vec<Position> {
        let inner = self.inner.read();
        inner
            .positions
            .get(&(account_id.to_string(), symbol.to_string()))
            .map(|m| m.values().filter(|p| !p.pending).cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_pending_positions(&self, account_id: &str, symbol: &str) -> Vec<Position> {
        let inner = self.inner.read();
        inner
            .positions
            .get(&(account_id.to_string(), symbol.to_string()))
            .map(|m| m.values().filter(|p| p.pending).cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_all_positions_for_account(&self, account_id: &str) -> Vec<Position> {
        let inner = self.inner.read();
        inner
            .positions
            .iter()
            .filter(|((acct, _), _)| acct == account_id)
            .flat_map(|(_, m)| m.values().cloned())
            .collect()
    }

    pub fn get_all_positions(&self) -> Vec<Position> {
        let inner = self.inner.read();
        inner.positions.values().flat_map(|m| m.values().cloned()).collect()
    }

    pub fn get_ticks(&self, symbol: &str) -> Vec<Tick> {
        let inner = self.inner.read();
        inner.ticks.get(symbol).cloned().unwrap_or_default()
    }

    pub fn last_tick(&self, symbol: &str) -> Option<Tick> {
        let inner = self.inner.read();
        inner.ticks.get(symbol).and_then(|v| v.last().copied())
    }

    pub fn get_account(&self, account_id: &str) -> Option<AccountState> {
        let inner = self.inner.read();
        inner.accounts.get(account_id).cloned()
    }

    pub fn get_accounts(&self) -> Vec<AccountState> {
        let inner = self.inner.read();
        inner.accounts.values().cloned().collect()
    }

    pub fn purge_positions(&self, older_than: SystemTime) {
        let mut inner = self.inner.write();
        inner.positions.retain(|_, items| {
            items.retain(|_, pos| pos.open_time >= older_than);
            !items.is_empty()
        });
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();

        let mut position_counts: HashMap<String, usize> = HashMap::new();
        let mut positions = Vec::new();
        for m in inner.positions.values() {
            for pos in m.values() {
                positions.push(pos.clone());
                if !pos.pending {
                    *position_counts.entry(pos.symbol.clone()).or_insert(0) += 1;
                }
            }
        }

        let symbols = inner
            .ticks
            .iter()
            .map(|(symbol, list)| {
                let (bid, ask, has_tick) = match list.last() {
                    Some(t) => (t.bid, t.ask, true),
                    None => (0.0, 0.0, false),
                };
                SymbolSnapshot {
                    symbol: symbol.clone(),
                    bid,
                    ask,
                    has_tick,
                    position_count: *position_counts.get(symbol).unwrap_or(&0),
                }
            })
            .collect();

        StoreSnapshot {
            symbols,
            accounts: inner.accounts.values().cloned().collect(),
            positions,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_peak_equity(accounts: &HashMap<String, AccountState>, state: &mut AccountState) {
    let prior_peak = accounts.get(&state.account_id).map(|a| a.peak_equity).unwrap_or(0.0);
    state.peak_equity = if state.equity > prior_peak || prior_peak == 0.0 {
        state.equity
    } else {
        prior_peak
    };
    state.recompute_drawdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GuardLevel;

    fn acct(id: &str, equity: f64) -> AccountState {
        AccountState {
            account_id: id.into(),
            balance: equity,
            equity,
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 0.0,
            drawdown_pct: 0.0,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        }
    }

    #[test]
    fn peak_equity_tracks_highest_equity() {
        let store = Store::new();
        store.set_account(acct("A1", 10000.0));
        store.set_account(acct("A1", 9000.0));
        let state = store.get_account("A1").unwrap();
        assert_eq!(state.peak_equity, 10000.0);
        assert!((state.drawdown_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn ticks_capped_at_2048() {
        let store = Store::new();
        let symbol: [u8; 16] = crate::model::encode_fixed("EURUSD");
        let ticks: Vec<Tick> = (0..2100)
            .map(|i| Tick {
                symbol,
                bid: 1.0 + i as f64 * 0.0001,
                ask: 1.0001 + i as f64 * 0.0001,
                time: SystemTime::now(),
            })
            .collect();
        store.add_ticks(ticks);
        assert_eq!(store.get_ticks("EURUSD").len(), MAX_TICKS_PER_SYMBOL);
    }

    #[test]
    fn position_upsert_by_id() {
        let store = Store::new();
        let pos = crate::model::Position {
            id: 1,
            symbol: "EURUSD".into(),
            side: crate::model::Side::Buy,
            volume: 0.01,
            price: 1.1,
            open_time: SystemTime::now(),
            magic: 1001,
            account_id: "A1".into(),
            pending: false,
            profit_loss: 5.0,
            swap: 0.0,
            comment: String::new(),
        };
        store.update_positions(vec![pos.clone()]);
        let mut updated = pos;
        updated.profit_loss = 7.5;
        store.update_positions(vec![updated]);
        let positions = store.get_positions("A1", "EURUSD");
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].profit_loss, 7.5);
    }
}
