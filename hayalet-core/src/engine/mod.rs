//! The 50ms reactor that ties every other module into one pipeline:
//! Guard → SmartClose → Consolidation filter → Scoring → Grid → Cascade.
//!
//! The original's `cmd/daemon` didn't preserve a "full" engine loop variant
//! (spec §9 Open Question); this module is built directly from spec §4.11/
//! §5 rather than transliterated from a single Go file, reusing the
//! teacher's channel-based scheduling idiom (`crossbeam_channel::select!`
//! over a timer/command/shutdown set).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{info, warn};

use crate::bridge::Bridge;
use crate::cascade::{CascadeEngine, CascadeManager, CascadeParams};
use crate::config::PresetConfig;
use crate::grid::{GridManager, MAGIC_BASE};
use crate::guard::Guard;
use crate::market::{ConsolidationFilter, MarketDetector, MarketDetectorConfig};
use crate::model::{Command, CommandType, DirectionHint, ScoringResult, Side};
use crate::resilience::{guard_stage, RunState};
use crate::scoring;
use crate::smartclose::{self, SmartCloseConfig};
use crate::store::Store;

const RECENT_COMMANDS_CAP: usize = 50;
const MIN_SYMBOL_LEN: usize = 3;
const MIN_TICKS_FOR_SCORING: usize = 50;
const QUEUE_CAP: usize = 1024;

/// A scoring pass result tagged with the (account, symbol) it was computed
/// for, published for the read-only status projection to consume.
#[derive(Debug, Clone)]
pub struct Signal {
    pub account_id: String,
    pub symbol: String,
    pub result: ScoringResult,
    pub time: SystemTime,
}

fn direction_hint(side: Option<Side>) -> DirectionHint {
    match side {
        Some(Side::Buy) => DirectionHint::BuyOnly,
        Some(Side::Sell) => DirectionHint::SellOnly,
        None => DirectionHint::Both,
    }
}

fn hint_to_side(hint: DirectionHint) -> Side {
    match hint {
        DirectionHint::SellOnly => Side::Sell,
        _ => Side::Buy,
    }
}

pub struct EngineSettings {
    pub preset: PresetConfig,
    pub smartclose: SmartCloseConfig,
    pub market_detector: MarketDetectorConfig,
    pub magic_base: i32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            preset: PresetConfig::default(),
            smartclose: SmartCloseConfig::default(),
            market_detector: MarketDetectorConfig::default(),
            magic_base: MAGIC_BASE,
        }
    }
}

pub struct Engine {
    store: Arc<Store>,
    bridge: Bridge,
    guard: Guard,
    smartclose_cfg: SmartCloseConfig,
    consolidation: ConsolidationFilter,
    grid: GridManager,
    cascade: CascadeManager,
    preset: PresetConfig,
    magic_base: i32,
    run_state: RunState,
    command_tx: Sender<Command>,
    command_rx: Receiver<Command>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    signal_tx: Sender<Signal>,
    signal_rx: Receiver<Signal>,
    recent_commands: VecDeque<Command>,
}

impl Engine {
    pub fn new(store: Arc<Store>, bridge: Bridge, levels: Vec<crate::config::DrawdownLevel>, cfg: EngineSettings) -> Self {
        let (command_tx, command_rx) = bounded(QUEUE_CAP);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (signal_tx, signal_rx) = bounded(QUEUE_CAP);
        Engine {
            store,
            bridge,
            guard: Guard::new(levels),
            smartclose_cfg: cfg.smartclose,
            consolidation: ConsolidationFilter::new(MarketDetector::new(cfg.market_detector)),
            grid: GridManager::new(),
            cascade: CascadeManager::new(),
            preset: cfg.preset,
            magic_base: cfg.magic_base,
            run_state: RunState::new(),
            command_tx,
            command_rx,
            shutdown_tx,
            shutdown_rx,
            signal_tx,
            signal_rx,
            recent_commands: VecDeque::with_capacity(RECENT_COMMANDS_CAP),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state.clone()
    }

    pub fn command_sender(&self) -> Sender<Command> {
        self.command_tx.clone()
    }

    pub fn shutdown_sender(&self) -> Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn signal_receiver(&self) -> Receiver<Signal> {
        self.signal_rx.clone()
    }

    pub fn recent_commands(&self) -> Vec<Command> {
        self.recent_commands.iter().cloned().collect()
    }

    fn record_command(&mut self, cmd: Command) {
        if self.recent_commands.len() >= RECENT_COMMANDS_CAP {
            self.recent_commands.pop_front();
        }
        self.recent_commands.push_back(cmd);
    }

    fn dispatch(&mut self, cmds: Vec<Command>) {
        for cmd in cmds {
            if !self.bridge.write_command(&cmd) {
                warn!(reason = %cmd.reason, "command_ring_full_dropped");
            }
            self.record_command(cmd);
        }
    }

    /// Every non-pending position on the account gets an opposite-side
    /// order of equal volume and the same magic (spec §4.11 "Hedge-all").
    fn hedge_all(&self, account_id: &str, now: SystemTime) -> Vec<Command> {
        self.store
            .get_all_positions_for_account(account_id)
            .into_iter()
            .filter(|p| !p.pending)
            .map(|p| Command {
                kind: CommandType::Open,
                symbol: p.symbol.clone(),
                side: p.side.opposite(),
                volume: p.volume,
                price: 0.0,
                tp: 0.0,
                sl: 0.0,
                ticket: 0,
                magic: p.magic,
                account_id: account_id.to_string(),
                reason: "HEDGE_ALL".into(),
                time: now,
            })
            .collect()
    }

    fn close_all(&self, account_id: &str, reason: &str, now: SystemTime) -> Vec<Command> {
        self.store
            .get_all_positions_for_account(account_id)
            .into_iter()
            .filter(|p| !p.pending)
            .map(|p| Command {
                kind: CommandType::Close,
                symbol: p.symbol.clone(),
                side: p.side,
                volume: p.volume,
                price: 0.0,
                tp: 0.0,
                sl: 0.0,
                ticket: p.id,
                magic: p.magic,
                account_id: account_id.to_string(),
                reason: reason.to_string(),
                time: now,
            })
            .collect()
    }

    /// Interpret one externally-submitted command before bridge-dispatch
    /// (spec §4.11 "Command channel").
    fn handle_external_command(&mut self, cmd: Command, now: SystemTime) {
        self.record_command(cmd.clone());
        match cmd.kind {
            CommandType::Pause => self.run_state.pause(),
            CommandType::Resume => self.run_state.resume(),
            CommandType::Freeze => self.run_state.freeze(),
            CommandType::HedgeAll => {
                let cmds = self.hedge_all(&cmd.account_id, now);
                self.dispatch(cmds);
            }
            CommandType::CloseAll => {
                let cmds = self.close_all(&cmd.account_id, "CLOSE_ALL", now);
                self.dispatch(cmds);
            }
            CommandType::Open | CommandType::Close | CommandType::Modify => {
                if !self.bridge.write_command(&cmd) {
                    warn!(reason = %cmd.reason, "command_ring_full_dropped");
                }
            }
        }
    }

    fn ensure_cascade(&mut self, account_id: &str, symbol: &str, grid_anchor: f64, direction: Side, now: SystemTime) {
        let depth = self.preset.cascade_levels;
        let cascade: &mut CascadeEngine = self.cascade.get_or_create(account_id, symbol, depth);
        if cascade.levels().first().map(|l| l.price == 0.0).unwrap_or(true) && grid_anchor != 0.0 {
            cascade.initialize(grid_anchor, self.preset.grid_spacing, direction);
        }
        let _ = now;
    }

    /// One pipeline pass over everything the bridge has produced since the
    /// last step (spec §4.11).
    pub fn step(&mut self, now: SystemTime) {
        for cmd in self.command_rx.try_iter().collect::<Vec<_>>() {
            self.handle_external_command(cmd, now);
        }

        let ticks = self.bridge.read_ticks(usize::MAX);
        self.store.add_ticks(ticks);
        let positions = self.bridge.read_positions(usize::MAX);
        self.store.update_positions(positions);
        let accounts = self.bridge.read_accounts(usize::MAX);
        self.store.update_accounts(accounts);
        self.bridge.heartbeat(now);

        if self.run_state.is_paused() || self.run_state.is_frozen() {
            return;
        }

        let snapshot = self.store.snapshot();
        for acct in &snapshot.accounts {
            let guard = guard_stage("guard", || self.guard.evaluate(acct));
            let Some(guard) = guard else { continue };

            if guard.force_close {
                let cmds = self.close_all(&acct.account_id, "GUARD_BLACK", now);
                self.dispatch(cmds);
                self.run_state.freeze();
                continue;
            }
            if guard.force_hedge {
                let cmds = self.hedge_all(&acct.account_id, now);
                self.dispatch(cmds);
                continue;
            }

            let account_positions = self.store.get_all_positions_for_account(&acct.account_id);
            let sc_result = guard_stage("smartclose", || {
                smartclose::evaluate(&self.smartclose_cfg, &account_positions, acct, now)
            });
            if let Some(sc_result) = sc_result {
                if sc_result.should_close {
                    self.dispatch(sc_result.commands);
                    continue;
                }
            }

            for symbol_snap in &snapshot.symbols {
                let symbol = &symbol_snap.symbol;
                if symbol.len() < MIN_SYMBOL_LEN || !symbol_snap.has_tick {
                    continue;
                }
                let ticks = self.store.get_ticks(symbol);

                let consolidation = guard_stage("consolidation", || self.consolidation.check(symbol, &ticks));
                let Some(consolidation) = consolidation else { continue };
                if consolidation.is_consolidating {
                    continue;
                }

                let direction = if ticks.len() >= MIN_TICKS_FOR_SCORING {
                    let result = guard_stage("scoring", || scoring::score(&ticks));
                    match result {
                        Some(result) => {
                            let _ = self.signal_tx.try_send(Signal {
                                account_id: acct.account_id.clone(),
                                symbol: symbol.clone(),
                                result,
                                time: now,
                            });
                            direction_hint(result.direction)
                        }
                        None => DirectionHint::Both,
                    }
                } else {
                    DirectionHint::Both
                };

                let preset = self.preset.clone();
                let symbol_positions: Vec<_> = account_positions
                    .iter()
                    .filter(|p| &p.symbol == symbol)
                    .cloned()
                    .collect();

                let magic_base = self.magic_base;
                let grid_cmds = guard_stage("grid", || {
                    let grid = self.grid.get_or_create(&acct.account_id, symbol, preset.clone(), now);
                    grid.evaluate(symbol_snap.bid, symbol_snap.ask, &symbol_positions, &guard, direction, magic_base, now)
                });
                let grid_anchor = self.grid.get(&acct.account_id, symbol).map(|g| g.state().anchor_price).unwrap_or(0.0);
                if let Some(cmds) = grid_cmds {
                    self.dispatch(cmds);
                }

                if preset.cascade_levels > 0 && guard.allow_cascade {
                    let cascade_side = hint_to_side(direction);
                    self.ensure_cascade(&acct.account_id, symbol, grid_anchor, cascade_side, now);
                    let params = CascadeParams {
                        base_lot: preset.base_lot,
                        lot_multiplier: preset.lot_multiplier,
                        direction: cascade_side,
                    };
                    let cascade_cmds = guard_stage("cascade", || {
                        let cascade = self.cascade.get_or_create(&acct.account_id, symbol, preset.cascade_levels);
                        cascade.evaluate(symbol_snap.bid, symbol_snap.ask, &symbol_positions, &guard, &params, now)
                    });
                    if let Some(cmds) = cascade_cmds {
                        self.dispatch(cmds);
                    }
                }
            }
        }
    }

    /// Drive the engine on a 50ms cadence until a shutdown is requested,
    /// selecting over the shutdown signal and the 50ms timer (spec §5:
    /// "the engine loop's only wait is on a multiplexed select over
    /// (shutdown, signal queue, command queue, 50ms timer)").
    pub fn run(&mut self, tick_interval: Duration) {
        info!(interval_ms = tick_interval.as_millis() as u64, "engine_loop_started");
        loop {
            crossbeam::channel::select! {
                recv(self.shutdown_rx) -> _ => {
                    info!("engine_loop_shutdown");
                    break;
                }
                default(tick_interval) => {
                    self.step(SystemTime::now());
                }
            }
            if self.run_state.should_shutdown() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::config::default_levels;
    use crate::model::{encode_fixed, AccountState, GuardLevel, Position, Tick};

    fn engine_with_store() -> (Engine, Arc<Store>) {
        let store = Arc::new(Store::new());
        let (bridge, _) = Bridge::open("/nonexistent/impossible/path", 4, 4, 4, 4);
        let engine = Engine::new(store.clone(), bridge, default_levels(), EngineSettings::default());
        (engine, store)
    }

    #[test]
    fn step_is_noop_when_paused() {
        let (mut engine, store) = engine_with_store();
        engine.run_state().pause();
        store.set_account(AccountState {
            account_id: "ACC1".into(),
            balance: 10000.0,
            equity: 5000.0,
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 10000.0,
            drawdown_pct: 50.0,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        });
        engine.step(SystemTime::now());
        assert!(engine.recent_commands().is_empty());
    }

    #[test]
    fn guard_black_emits_close_all_and_freezes() {
        let (mut engine, store) = engine_with_store();
        // Establish peakEquity at 10000 first; the store derives peak/drawdown
        // from each account's own history rather than the caller-supplied
        // fields (spec §4.3), so a 45% drawdown takes two writes to produce.
        store.set_account(AccountState {
            account_id: "ACC1".into(),
            balance: 10000.0,
            equity: 10000.0,
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 0.0,
            drawdown_pct: 0.0,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        });
        store.set_account(AccountState {
            account_id: "ACC1".into(),
            balance: 10000.0,
            equity: 5500.0,
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 0.0,
            drawdown_pct: 0.0,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        });
        for id in 1..=3 {
            store.update_positions(vec![Position {
                id,
                symbol: "EURUSD".into(),
                side: Side::Buy,
                volume: 0.1,
                price: 1.1,
                open_time: SystemTime::now(),
                magic: 1001,
                account_id: "ACC1".into(),
                pending: false,
                profit_loss: -1.0,
                swap: 0.0,
                comment: String::new(),
            }]);
        }
        engine.step(SystemTime::now());
        let closes: Vec<_> = engine.recent_commands().into_iter().filter(|c| c.reason == "GUARD_BLACK").collect();
        assert_eq!(closes.len(), 3);
        assert!(engine.run_state().is_frozen());
    }

    #[test]
    fn external_pause_resume_flips_run_state() {
        let (mut engine, _store) = engine_with_store();
        let sender = engine.command_sender();
        sender
            .send(Command {
                kind: CommandType::Pause,
                symbol: String::new(),
                side: Side::Buy,
                volume: 0.0,
                price: 0.0,
                tp: 0.0,
                sl: 0.0,
                ticket: 0,
                magic: 0,
                account_id: "ACC1".into(),
                reason: String::new(),
                time: SystemTime::now(),
            })
            .unwrap();
        engine.step(SystemTime::now());
        assert!(engine.run_state().is_paused());
    }

    #[test]
    fn fresh_symbol_grid_evaluation_emits_no_commands_but_sets_anchor() {
        let (mut engine, store) = engine_with_store();
        store.set_account(AccountState {
            account_id: "ACC1".into(),
            balance: 10000.0,
            equity: 10000.0,
            margin: 0.0,
            free_margin: 0.0,
            margin_level: 0.0,
            peak_equity: 10000.0,
            drawdown_pct: 0.0,
            guard_level: GuardLevel::Green,
            time: SystemTime::now(),
        });
        let symbol: [u8; 16] = encode_fixed("EURUSD");
        store.add_ticks(vec![Tick { symbol, bid: 1.1000, ask: 1.1002, time: SystemTime::now() }]);
        engine.step(SystemTime::now());
        let grid_cmds: Vec<_> = engine.recent_commands().into_iter().filter(|c| c.reason.starts_with("GRID_")).collect();
        assert!(grid_cmds.is_empty());
    }
}
