//! Engine run-state flag and per-stage panic containment.
//!
//! Adapted from the teacher's `KillSwitch`/panic-hook pair, simplified to
//! the three states the engine actually exposes (spec §4.2/§7g):
//! `Running`/`Paused`/`Frozen`. Unlike the teacher's hook, [`guard_stage`]
//! does not terminate the process — a panicking pipeline stage freezes and
//! logs, the engine loop continues (spec §7g).

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::error;

use crate::model::EngineMode;

const RUNNING: u8 = 0;
const PAUSED: u8 = 1;
const FROZEN: u8 = 2;

/// Thread-safe engine run-state flag shared between the engine thread
/// (writer) and the projection thread (reader).
#[derive(Clone)]
pub struct RunState {
    mode: Arc<AtomicU8>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        RunState {
            mode: Arc::new(AtomicU8::new(RUNNING)),
            shutdown: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn mode(&self) -> EngineMode {
        match self.mode.load(Ordering::Acquire) {
            PAUSED => EngineMode::Paused,
            FROZEN => EngineMode::Frozen,
            _ => EngineMode::Running,
        }
    }

    pub fn pause(&self) {
        self.mode.store(PAUSED, Ordering::Release);
    }

    pub fn resume(&self) {
        self.mode.store(RUNNING, Ordering::Release);
    }

    /// Latch the engine into FROZEN. Clearing requires an explicit RESUME
    /// (spec §7 "Propagation": "clearing requires an explicit RESUME command").
    pub fn freeze(&self) {
        self.mode.store(FROZEN, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.mode() == EngineMode::Paused
    }

    pub fn is_frozen(&self) -> bool {
        self.mode() == EngineMode::Frozen
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f`, catching any panic at this boundary and logging it instead of
/// letting it unwind into the caller (spec §7g: "Panics inside any pipeline
/// stage — caught at the stage boundary; engine freezes, logs, continues
/// loop"). Requires `panic = "unwind"` in the release profile.
pub fn guard_stage<T>(stage: &str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "<no message>".to_string()
            };
            error!(stage, message, "pipeline_stage_panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let state = RunState::new();
        assert_eq!(state.mode(), EngineMode::Running);
    }

    #[test]
    fn pause_resume_round_trips() {
        let state = RunState::new();
        state.pause();
        assert!(state.is_paused());
        state.resume();
        assert_eq!(state.mode(), EngineMode::Running);
    }

    #[test]
    fn freeze_requires_explicit_resume() {
        let state = RunState::new();
        state.freeze();
        assert!(state.is_frozen());
        state.resume();
        assert_eq!(state.mode(), EngineMode::Running);
    }

    #[test]
    fn guard_stage_catches_panic_and_returns_none() {
        let result = guard_stage("test_stage", || -> i32 { panic!("boom") });
        assert!(result.is_none());
    }

    #[test]
    fn guard_stage_passes_through_value() {
        let result = guard_stage("test_stage", || 42);
        assert_eq!(result, Some(42));
    }
}
