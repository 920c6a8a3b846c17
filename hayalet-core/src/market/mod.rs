//! Market condition classifier and the consolidation filter that wraps it.
//!
//! Grounded on `internal/engine/market.go`'s `MarketDetector`/
//! `ConsolidationFilter`.

use std::collections::HashMap;

use crate::indicators;
use crate::model::{ConsolidationState, MarketState, Tick};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketDetectorConfig {
    pub atr_period: usize,
    pub adx_period: usize,
    pub range_adx: f64,
    pub trend_adx: f64,
}

impl Default for MarketDetectorConfig {
    fn default() -> Self {
        MarketDetectorConfig {
            atr_period: 14,
            adx_period: 14,
            range_adx: 20.0,
            trend_adx: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketAnalysis {
    pub state: MarketState,
    pub atr: f64,
    pub avg_atr: f64,
    pub atr_ratio: f64,
    pub is_consolidating: bool,
}

pub struct MarketDetector {
    cfg: MarketDetectorConfig,
}

impl MarketDetector {
    pub fn new(cfg: MarketDetectorConfig) -> Self {
        MarketDetector { cfg }
    }

    /// Classify the market regime for one symbol's tick history (spec §4.5).
    pub fn analyze(&self, ticks: &[Tick]) -> MarketAnalysis {
        if ticks.len() < self.cfg.atr_period + 1 {
            return MarketAnalysis {
                state: MarketState::Range,
                atr: 0.0,
                avg_atr: 0.0,
                atr_ratio: 0.0,
                is_consolidating: false,
            };
        }

        let (atr, avg_atr) = indicators::atr(ticks, self.cfg.atr_period);
        let atr_ratio = if avg_atr > 0.0 { atr / avg_atr } else { 0.0 };
        let is_consolidating = atr_ratio < 0.5;

        let mids = indicators::mids(ticks);
        let adx = indicators::simplified_adx(&mids, self.cfg.adx_period);

        let state = if adx < self.cfg.range_adx {
            MarketState::Range
        } else if adx >= self.cfg.trend_adx {
            MarketState::Trend
        } else if atr_ratio > 2.0 {
            MarketState::Volatile
        } else {
            MarketState::Range
        };

        MarketAnalysis {
            state,
            atr,
            avg_atr,
            atr_ratio,
            is_consolidating,
        }
    }
}

/// Caches the last [`ConsolidationState`] per symbol so the engine can
/// short-circuit grid evaluation without re-running the detector.
pub struct ConsolidationFilter {
    detector: MarketDetector,
    states: HashMap<String, ConsolidationState>,
}

impl ConsolidationFilter {
    pub fn new(detector: MarketDetector) -> Self {
        ConsolidationFilter {
            detector,
            states: HashMap::new(),
        }
    }

    pub fn check(&mut self, symbol: &str, ticks: &[Tick]) -> ConsolidationState {
        let analysis = self.detector.analyze(ticks);
        let state = ConsolidationState {
            current_atr: analysis.atr,
            average_atr: analysis.avg_atr,
            atr_ratio: analysis.atr_ratio,
            is_consolidating: analysis.is_consolidating,
        };
        self.states.insert(symbol.to_string(), state);
        state
    }

    pub fn is_consolidating(&self, symbol: &str) -> bool {
        self.states
            .get(symbol)
            .map(|s| s.is_consolidating)
            .unwrap_or(false)
    }
}
