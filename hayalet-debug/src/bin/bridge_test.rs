//! Standalone SHM bridge diagnostic: opens the ring buffers directly (no
//! engine, no store) and prints every tick/position/account it reads,
//! with running counters, until interrupted.
//!
//! Grounded on the original `cmd/bridge-test/main.go`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hayalet_core::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "HAYALET bridge diagnostic")]
struct Args {
    #[arg(long, default_value = "HAYALET_SHM")]
    name: String,

    #[arg(long, default_value_t = 4096)]
    ticks: u32,

    #[arg(long, default_value_t = 1024)]
    pos: u32,

    #[arg(long, default_value_t = 512)]
    cmd: u32,

    #[arg(long, default_value_t = 64)]
    acct: u32,

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

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let (mut bridge, warning) = Bridge::open(&args.name, args.ticks, args.pos, args.cmd, args.acct);
    if let Some(BridgeWarning(msg)) = warning {
        println!("bridge opened in PIPE mode: {msg}");
    } else {
        println!("bridge opened in SHM mode: {}", args.name);
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    let mut tick_count = 0u64;
    let mut pos_count = 0u64;
    let mut acct_count = 0u64;

    while running.load(Ordering::SeqCst) {
        for tick in bridge.read_ticks(256) {
            tick_count += 1;
            println!(
                "TICK #{tick_count} {} bid={:.5} ask={:.5}",
                tick.symbol_str(),
                tick.bid,
                tick.ask
            );
        }
        for pos in bridge.read_positions(256) {
            pos_count += 1;
            println!(
                "POS #{pos_count} {} {} {} vol={:.2} price={:.5} magic={}",
                pos.account_id, pos.symbol, pos.side, pos.volume, pos.price, pos.magic
            );
        }
        for acct in bridge.read_accounts(16) {
            acct_count += 1;
            println!(
                "ACCT #{acct_count} {} equity={:.2} drawdown={:.2}%",
                acct.account_id, acct.equity, acct.drawdown_pct
            );
        }
        bridge.heartbeat(SystemTime::now());
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("totals: ticks={tick_count} positions={pos_count} accounts={acct_count}");
    Ok(())
}
