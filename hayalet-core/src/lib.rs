//! Hayalet Core - the trading engine and SHM bridge behind the HAYALET
//! supervisor daemon.
//!
//! The daemon sits beside a MetaTrader-style terminal, observes ticks and
//! position/account state published over shared memory, and decides in
//! real time what grid/cascade/hedge/close commands to send back.
//!
//! ## Pipeline
//! Every engine tick runs: Guard → SmartClose → Consolidation filter →
//! Scoring → Grid → Cascade, per account and per symbol.
//!
//! ## Core Modules
//! - `model`: shared data types (ticks, positions, accounts, commands)
//! - `bridge`: the SHM wire codec and the mmap'd ring-buffer transport
//! - `store`: thread-safe snapshot store for ticks/positions/accounts
//! - `indicators`: pure indicator math (SMA/EMA/RSI/MACD/Bollinger/ADX/ATR)
//! - `market`: market regime classification and consolidation filtering
//! - `scoring`: composite multi-indicator directional bias
//! - `guard`: drawdown-to-protection-level mapping
//! - `smartclose`: emergency/portfolio/worst+group position closing
//! - `grid`: anchored averaging ladder per (account, symbol)
//! - `cascade`: progressive reinforcement levels layered on the grid
//! - `engine`: the 50ms reactor tying the pipeline together
//! - `config`: plain deserializable configuration types
//! - `resilience`: run-state flag and per-stage panic containment

pub mod bridge;
pub mod cascade;
pub mod config;
pub mod engine;
pub mod grid;
pub mod guard;
pub mod indicators;
pub mod market;
pub mod model;
pub mod resilience;
pub mod scoring;
pub mod smartclose;
pub mod store;

pub use anyhow::{Error, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::bridge::{Bridge, BridgeMode, BridgeWarning};
    pub use crate::config::{BridgeConfig, DrawdownLevel, EngineConfig, PresetConfig};
    pub use crate::engine::{Engine, EngineSettings, Signal};
    pub use crate::guard::{Guard, GuardResult};
    pub use crate::model::{
        AccountState, Command, CommandType, DirectionHint, EngineMode, GuardLevel, MarketState,
        Position, Side, Tick,
    };
    pub use crate::resilience::{guard_stage, RunState};
    pub use crate::store::Store;
    pub use crate::{Error, Result};
}
