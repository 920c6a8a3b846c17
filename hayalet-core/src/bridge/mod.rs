//! The IPC layer between this daemon and the terminal-side producer.
//!
//! [`Bridge`] wraps either a memory-mapped [`shm::SharedMemory`] region or,
//! when the mapping can't be opened, an in-process command queue
//! ("PIPE mode", for development and tests without a counterparty) —
//! grounded on the Go original's `Bridge`/`OpenSharedMemory` pair
//! (`internal/bridge/bridge.go`, `internal/bridge/shm_windows.go`).

pub mod codec;
pub mod shm;

use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::model::{AccountState, Command, Position, Tick};

const PIPE_QUEUE_CAP: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    Shm,
    Pipe,
}

/// Non-fatal warning surfaced when the SHM region couldn't be opened.
#[derive(Debug, Clone)]
pub struct BridgeWarning(pub String);

pub struct Bridge {
    mode: BridgeMode,
    shm: Option<shm::SharedMemory>,
    cmd_tx: Sender<Command>,
    cmd_rx: Receiver<Command>,
}

impl Bridge {
    /// Attempt to open the named SHM region; degrade to PIPE mode on
    /// failure rather than returning an error (spec §4.2/§7b).
    pub fn open(
        name: &str,
        tick_cap: u32,
        pos_cap: u32,
        cmd_cap: u32,
        acct_cap: u32,
    ) -> (Bridge, Option<BridgeWarning>) {
        let (cmd_tx, cmd_rx) = bounded(PIPE_QUEUE_CAP);
        match shm::SharedMemory::open(name, tick_cap, pos_cap, cmd_cap, acct_cap) {
            Ok(shm) => (
                Bridge {
                    mode: BridgeMode::Shm,
                    shm: Some(shm),
                    cmd_tx,
                    cmd_rx,
                },
                None,
            ),
            Err(e) => (
                Bridge {
                    mode: BridgeMode::Pipe,
                    shm: None,
                    cmd_tx,
                    cmd_rx,
                },
                Some(BridgeWarning(format!("SHM unavailable, using pipe mode: {e}"))),
            ),
        }
    }

    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    pub fn read_ticks(&mut self, max: usize) -> Vec<Tick> {
        match &mut self.shm {
            Some(shm) => shm.read_ticks(max),
            None => Vec::new(),
        }
    }

    pub fn read_positions(&mut self, max: usize) -> Vec<Position> {
        match &mut self.shm {
            Some(shm) => shm.read_positions(max),
            None => Vec::new(),
        }
    }

    pub fn read_accounts(&mut self, max: usize) -> Vec<AccountState> {
        match &mut self.shm {
            Some(shm) => shm.read_accounts(max),
            None => Vec::new(),
        }
    }

    /// Write a command to the bridge; returns `false` if the ring (or the
    /// PIPE queue) is full. The PIPE queue never delivers anywhere — it
    /// only retains commands for inspection (spec §9 "Degraded mode").
    pub fn write_command(&mut self, cmd: &Command) -> bool {
        match &mut self.shm {
            Some(shm) => shm.write_command(cmd),
            None => self.cmd_tx.try_send(cmd.clone()).is_ok(),
        }
    }

    /// Drain commands retained by the PIPE queue (diagnostic/test use
    /// only; SHM mode has no equivalent since the terminal drains its own
    /// side).
    pub fn drain_pipe_commands(&self) -> Vec<Command> {
        self.cmd_rx.try_iter().collect()
    }

    pub fn heartbeat(&self, now: SystemTime) {
        if let Some(shm) = &self.shm {
            let ns = now
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            shm.heartbeat(ns);
        }
    }

    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_mode_round_trips_through_queue() {
        let (mut bridge, warning) = Bridge::open("/nonexistent/impossible/path", 4, 4, 4, 4);
        assert_eq!(bridge.mode(), BridgeMode::Pipe);
        assert!(warning.is_some());

        let cmd = Command {
            kind: crate::model::CommandType::Open,
            symbol: "EURUSD".into(),
            side: crate::model::Side::Buy,
            volume: 0.01,
            price: 1.1,
            tp: 0.0,
            sl: 0.0,
            ticket: 0,
            magic: 1001,
            account_id: "ACC1".into(),
            reason: "GRID_L1".into(),
            time: SystemTime::now(),
        };
        assert!(bridge.write_command(&cmd));
        let drained = bridge.drain_pipe_commands();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].reason, "GRID_L1");
    }

    #[test]
    fn shm_mode_opens_for_valid_path() {
        let name = format!("hayalet-bridge-test-{}", std::process::id());
        let (bridge, warning) = Bridge::open(&name, 64, 64, 16, 8);
        assert_eq!(bridge.mode(), BridgeMode::Shm);
        assert!(warning.is_none());
        std::fs::remove_file(format!("/dev/shm/{name}")).ok();
    }
}
