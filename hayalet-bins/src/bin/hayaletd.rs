//! The HAYALET supervisor daemon: opens the SHM bridge to the terminal,
//! builds the trading engine, and runs its 50ms pipeline until signalled
//! to stop.
//!
//! Grounded on the original `internal/app/app.go` lifecycle (build
//! logger, open bridge, seed demo data when the bridge falls back to
//! PIPE mode, run the engine loop, select on OS signals) and on this
//! workspace's own CLI/logging idiom (`bog-bins/src/common.rs`).

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hayalet_core::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "HAYALET supervisor daemon")]
struct Args {
    /// Name of the shared-memory region to open (falls back to PIPE mode
    /// on failure, seeding demo data instead).
    #[arg(long, default_value = "HAYALET_SHM")]
    shm_name: String,

    #[arg(long, default_value_t = 4096)]
    tick_capacity: u32,

    #[arg(long, default_value_t = 512)]
    position_capacity: u32,

    #[arg(long, default_value_t = 1024)]
    command_capacity: u32,

    #[arg(long, default_value_t = 64)]
    account_capacity: u32,

    #[arg(long, default_value_t = 50)]
    tick_interval_ms: u64,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
    Ok(())
}

/// Hand-authored starting state for PIPE mode, when there is no terminal
/// on the other end of the bridge to publish real ticks/positions/
/// accounts (spec §7b "Degraded mode"). Mirrors `seedDemoData` in the
/// original daemon: one account near a 1.5% drawdown and a handful of
/// open positions spread across five symbols and several grid/cascade
/// magics.
fn seed_demo_data(store: &Store) {
    store.set_account(AccountState {
        account_id: "25289974".into(),
        balance: 10000.0,
        equity: 9847.35,
        margin: 312.50,
        free_margin: 9534.85,
        margin_level: 3151.0,
        peak_equity: 0.0,
        drawdown_pct: 0.0,
        guard_level: GuardLevel::Green,
        time: SystemTime::now(),
    });

    let symbols = ["EURUSD", "GBPUSD", "USDJPY", "XAUUSD", "USDCHF"];
    let prices = [1.0850, 1.2650, 149.80, 2015.0, 0.8820];
    let now = SystemTime::now();
    store.add_ticks(symbols.iter().zip(prices).map(|(sym, mid)| Tick {
        symbol: hayalet_core::model::encode_fixed(sym),
        bid: mid - 0.0002,
        ask: mid + 0.0002,
        time: now,
    }));

    let magics = [1001, 1501, 2001, 3001, 4001, 5001, 1010];
    let sides = [
        Side::Buy,
        Side::Sell,
        Side::Buy,
        Side::Buy,
        Side::Sell,
        Side::Sell,
        Side::Buy,
    ];
    let positions = symbols
        .iter()
        .cycle()
        .zip(prices.iter().cycle())
        .zip(magics.iter().zip(sides.iter()))
        .enumerate()
        .take(7)
        .map(|(i, ((sym, price), (magic, side)))| Position {
            id: 1000 + i as i64,
            symbol: (*sym).to_string(),
            side: *side,
            volume: 0.01 * (i as f64 + 1.0),
            price: *price,
            open_time: now,
            magic: *magic,
            account_id: "25289974".into(),
            pending: false,
            profit_loss: 0.0,
            swap: 0.0,
            comment: "demo".into(),
        });
    store.update_positions(positions);
}

/// Stand-in for a terminal-side producer when running in PIPE mode: a
/// sine-wave-plus-random-walk price simulation with periodic equity
/// jitter, so the engine has something to react to (mirrors the
/// original's `demoTickLoop`).
fn demo_tick_loop(store: Arc<Store>, run_state: RunState) {
    std::thread::spawn(move || {
        let symbols = ["EURUSD", "GBPUSD", "USDJPY", "XAUUSD", "USDCHF"];
        let mut mids = [1.0850_f64, 1.2650, 149.80, 2015.0, 0.8820];
        let mut rng = rand::thread_rng();
        let mut step: u64 = 0;
        loop {
            if run_state.should_shutdown() {
                return;
            }
            step += 1;
            let now = SystemTime::now();
            for (mid, symbol) in mids.iter_mut().zip(symbols) {
                let wave = (step as f64 * 0.05).sin() * 0.0003;
                let walk = rng.gen_range(-0.0002..0.0002);
                *mid += wave + walk;
                store.add_ticks(std::iter::once(Tick {
                    symbol: hayalet_core::model::encode_fixed(symbol),
                    bid: *mid - 0.0002,
                    ask: *mid + 0.0002,
                    time: now,
                }));
            }
            if step.is_multiple_of(10) {
                if let Some(mut acct) = store.get_account("25289974") {
                    acct.equity += rng.gen_range(-15.0..15.0);
                    acct.time = now;
                    store.set_account(acct);
                }
            }
            std::thread::sleep(Duration::from_millis(500));
        }
    });
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!(shm_name = %args.shm_name, "hayaletd_starting");

    let (bridge, warning) = Bridge::open(
        &args.shm_name,
        args.tick_capacity,
        args.position_capacity,
        args.command_capacity,
        args.account_capacity,
    );
    let degraded = warning.is_some();
    if let Some(BridgeWarning(msg)) = warning {
        warn!(%msg, "bridge_degraded");
    } else {
        info!("bridge_shm_opened");
    }

    let store = Arc::new(Store::new());
    if degraded {
        seed_demo_data(&store);
    }

    let levels = hayalet_core::config::default_levels();
    let mut engine = Engine::new(store.clone(), bridge, levels, EngineSettings::default());
    let run_state = engine.run_state();
    let shutdown_tx = engine.shutdown_sender();

    if degraded {
        demo_tick_loop(store, run_state.clone());
    }

    ctrlc::set_handler(move || {
        info!("shutdown_signal_received");
        run_state.request_shutdown();
        let _ = shutdown_tx.send(());
    })?;

    engine.run(Duration::from_millis(args.tick_interval_ms));
    info!("hayaletd_stopped");
    Ok(())
}
