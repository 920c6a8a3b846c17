//! Plain, serde-deserializable configuration types.
//!
//! Grounded on `internal/config/config.go`, trimmed to the sections this
//! crate actually consumes (the full YAML-file config also carries API/gRPC/
//! dashboard/stealth sections that belong to outer surfaces this crate does
//! not implement — see `DESIGN.md`). No file I/O lives here; callers load
//! and deserialize YAML/JSON themselves and hand in the resulting struct.

use serde::{Deserialize, Serialize};

/// A single Balance Guard level (spec §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownLevel {
    pub name: String,
    pub threshold_percent: f64,
    pub max_grid_level: i32,
    pub lot_scale: f64,
    pub allow_cascade: bool,
    pub allow_stealth: bool,
    pub force_hedge: bool,
    pub force_close: bool,
}

/// The default five-level Balance Guard ladder (GREEN/YELLOW/ORANGE/RED/BLACK).
pub fn default_levels() -> Vec<DrawdownLevel> {
    vec![
        DrawdownLevel {
            name: "GREEN".into(),
            threshold_percent: 0.0,
            max_grid_level: 100,
            lot_scale: 1.0,
            allow_cascade: true,
            allow_stealth: true,
            force_hedge: false,
            force_close: false,
        },
        DrawdownLevel {
            name: "YELLOW".into(),
            threshold_percent: 10.0,
            max_grid_level: 50,
            lot_scale: 0.75,
            allow_cascade: true,
            allow_stealth: true,
            force_hedge: false,
            force_close: false,
        },
        DrawdownLevel {
            name: "ORANGE".into(),
            threshold_percent: 20.0,
            max_grid_level: 20,
            lot_scale: 0.5,
            allow_cascade: true,
            allow_stealth: false,
            force_hedge: false,
            force_close: false,
        },
        DrawdownLevel {
            name: "RED".into(),
            threshold_percent: 30.0,
            max_grid_level: 5,
            lot_scale: 0.25,
            allow_cascade: false,
            allow_stealth: false,
            force_hedge: true,
            force_close: false,
        },
        DrawdownLevel {
            name: "BLACK".into(),
            threshold_percent: 40.0,
            max_grid_level: 0,
            lot_scale: 0.0,
            allow_cascade: false,
            allow_stealth: false,
            force_hedge: false,
            force_close: true,
        },
    ]
}

/// A trading strategy preset (spec §4.9/§4.10 inputs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetConfig {
    pub name: String,
    pub grid_spacing: f64,
    pub max_levels: i32,
    pub base_lot: f64,
    pub lot_multiplier: f64,
    pub tp_pips: f64,
    pub cascade_levels: i32,
}

impl Default for PresetConfig {
    fn default() -> Self {
        PresetConfig {
            name: "default".into(),
            grid_spacing: 10.0,
            max_levels: 10,
            base_lot: 0.01,
            lot_multiplier: 1.5,
            tp_pips: 15.0,
            cascade_levels: 3,
        }
    }
}

/// SHM bridge ring capacities (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub shared_memory_name: String,
    pub tick_capacity: u32,
    pub position_capacity: u32,
    pub command_capacity: u32,
    pub account_capacity: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            shared_memory_name: "hayalet-bridge".into(),
            tick_capacity: 4096,
            position_capacity: 512,
            command_capacity: 1024,
            account_capacity: 64,
        }
    }
}

/// Top-level engine tuning (spec §4.11).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_preset: String,
    pub tick_interval_ms: u64,
    pub market_detector: crate::market::MarketDetectorConfig,
    pub presets: Vec<PresetConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_preset: "default".into(),
            tick_interval_ms: 50,
            market_detector: crate::market::MarketDetectorConfig::default(),
            presets: vec![PresetConfig::default()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_levels_are_ordered_by_threshold() {
        let levels = default_levels();
        for pair in levels.windows(2) {
            assert!(pair[0].threshold_percent < pair[1].threshold_percent);
        }
    }

    #[test]
    fn default_engine_config_round_trips_json() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
