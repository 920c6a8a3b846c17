//! Shared-memory ring buffer fabric: maps the region, validates the header,
//! and exposes lock-free SPSC read/write operations over the four rings.
//!
//! The Go/MT-side original reaches the region through
//! `ReadProcessMemory`/`WriteProcessMemory`; that is a Windows IPC quirk,
//! not a portable pattern. Here the same acquire/release cursor discipline
//! (spec §5/§9) is expressed directly over a `memmap2::MmapMut` using
//! atomic loads/stores, which is both simpler and works on the platform
//! this workspace builds for.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use memmap2::MmapMut;

use super::codec::{
    Header, WireAccount, WireCommand, WirePosition, WireTick, ACCOUNT_ENTRY_SIZE,
    COMMAND_ENTRY_SIZE, HEADER_BYTES, HEARTBEAT_OFFSET, POSITION_ENTRY_SIZE, SHM_VERSION,
    TICK_ENTRY_SIZE,
};
use crate::model::{AccountState, Command, Position, Tick};

/// Offsets of the cursor fields within the header, in bytes.
mod off {
    pub const VERSION: usize = 0;
    pub const TICK_CAP: usize = 4;
    pub const POS_CAP: usize = 8;
    pub const CMD_CAP: usize = 12;
    pub const ACCT_CAP: usize = 16;
    pub const TICK_WRITE: usize = 20;
    pub const TICK_READ: usize = 24;
    pub const POS_WRITE: usize = 28;
    pub const POS_READ: usize = 32;
    pub const CMD_WRITE: usize = 36;
    pub const CMD_READ: usize = 40;
    pub const ACCT_WRITE: usize = 44;
    pub const ACCT_READ: usize = 48;
    /// 4 bytes of alignment padding separate `ACCT_READ` from the heartbeat
    /// u64 — see `codec::HEARTBEAT_OFFSET`.
    pub const HEARTBEAT: usize = super::HEARTBEAT_OFFSET;
}

/// A memory-mapped SHM region holding the header and the four rings.
pub struct SharedMemory {
    map: MmapMut,
    tick_cap: u32,
    pos_cap: u32,
    cmd_cap: u32,
    acct_cap: u32,
    ticks_off: usize,
    poses_off: usize,
    cmds_off: usize,
    accts_off: usize,
}

fn region_len(tick_cap: u32, pos_cap: u32, cmd_cap: u32, acct_cap: u32) -> usize {
    HEADER_BYTES
        + tick_cap as usize * TICK_ENTRY_SIZE
        + pos_cap as usize * POSITION_ENTRY_SIZE
        + cmd_cap as usize * COMMAND_ENTRY_SIZE
        + acct_cap as usize * ACCOUNT_ENTRY_SIZE
}

impl SharedMemory {
    /// Open (creating if necessary) a POSIX shared-memory object under
    /// `/dev/shm/<name>` sized for the given ring capacities, and validate
    /// or initialize its header.
    pub fn open(name: &str, tick_cap: u32, pos_cap: u32, cmd_cap: u32, acct_cap: u32) -> std::io::Result<Self> {
        let len = region_len(tick_cap, pos_cap, cmd_cap, acct_cap);
        let path = shm_path(name);

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.set_len(len as u64)?;

        let mut map = unsafe { MmapMut::map_mut(&file)? };

        let version = u32::from_le_bytes(map[off::VERSION..off::VERSION + 4].try_into().unwrap());
        if version == 0 {
            let hdr = Header::new(tick_cap, pos_cap, cmd_cap, acct_cap);
            hdr.encode(&mut map[0..HEADER_BYTES]);
        } else if version != SHM_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "incompatible SHM version",
            ));
        } else {
            let read_u32 = |o: usize| u32::from_le_bytes(map[o..o + 4].try_into().unwrap());
            let stored = (
                read_u32(off::TICK_CAP),
                read_u32(off::POS_CAP),
                read_u32(off::CMD_CAP),
                read_u32(off::ACCT_CAP),
            );
            if stored != (tick_cap, pos_cap, cmd_cap, acct_cap) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("SHM region was created with capacities {stored:?}, not ({tick_cap}, {pos_cap}, {cmd_cap}, {acct_cap})"),
                ));
            }
        }

        let ticks_off = HEADER_BYTES;
        let poses_off = ticks_off + tick_cap as usize * TICK_ENTRY_SIZE;
        let cmds_off = poses_off + pos_cap as usize * POSITION_ENTRY_SIZE;
        let accts_off = cmds_off + cmd_cap as usize * COMMAND_ENTRY_SIZE;

        Ok(SharedMemory {
            map,
            tick_cap,
            pos_cap,
            cmd_cap,
            acct_cap,
            ticks_off,
            poses_off,
            cmds_off,
            accts_off,
        })
    }

    fn cursor(&self, offset: usize) -> &AtomicU32 {
        let ptr = self.map.as_ptr().wrapping_add(offset) as *const AtomicU32;
        unsafe { &*ptr }
    }

    fn heartbeat_cell(&self) -> &AtomicU64 {
        let ptr = self.map.as_ptr().wrapping_add(off::HEARTBEAT) as *const AtomicU64;
        unsafe { &*ptr }
    }

    pub fn read_ticks(&mut self, max: usize) -> Vec<Tick> {
        let write = self.cursor(off::TICK_WRITE).load(Ordering::Acquire);
        let mut read = self.cursor(off::TICK_READ).load(Ordering::Relaxed);
        let mut out = Vec::with_capacity(max);
        for _ in 0..max {
            if read == write {
                break;
            }
            let idx = (read % self.tick_cap) as usize;
            let start = self.ticks_off + idx * TICK_ENTRY_SIZE;
            let slot = &self.map[start..start + TICK_ENTRY_SIZE];
            match WireTick::decode(slot) {
                Ok(wire) => out.push(wire.to_model()),
                Err(_) => break,
            }
            read = read.wrapping_add(1);
        }
        self.cursor(off::TICK_READ).store(read, Ordering::Release);
        out
    }

    pub fn read_positions(&mut self, max: usize) -> Vec<Position> {
        let write = self.cursor(off::POS_WRITE).load(Ordering::Acquire);
        let mut read = self.cursor(off::POS_READ).load(Ordering::Relaxed);
        let mut out = Vec::with_capacity(max);
        for _ in 0..max {
            if read == write {
                break;
            }
            let idx = (read % self.pos_cap) as usize;
            let start = self.poses_off + idx * POSITION_ENTRY_SIZE;
            let slot = &self.map[start..start + POSITION_ENTRY_SIZE];
            match WirePosition::decode(slot) {
                Ok(wire) => out.push(wire.to_model()),
                Err(_) => break,
            }
            read = read.wrapping_add(1);
        }
        self.cursor(off::POS_READ).store(read, Ordering::Release);
        out
    }

    pub fn read_accounts(&mut self, max: usize) -> Vec<AccountState> {
        let write = self.cursor(off::ACCT_WRITE).load(Ordering::Acquire);
        let mut read = self.cursor(off::ACCT_READ).load(Ordering::Relaxed);
        let mut out = Vec::with_capacity(max);
        for _ in 0..max {
            if read == write {
                break;
            }
            let idx = (read % self.acct_cap) as usize;
            let start = self.accts_off + idx * ACCOUNT_ENTRY_SIZE;
            let slot = &self.map[start..start + ACCOUNT_ENTRY_SIZE];
            match WireAccount::decode(slot) {
                Ok(wire) => {
                    let mut acct = AccountState {
                        account_id: wire.account_id(),
                        balance: wire.balance,
                        equity: wire.equity,
                        margin: wire.margin,
                        free_margin: 0.0,
                        margin_level: 0.0,
                        peak_equity: 0.0,
                        drawdown_pct: 0.0,
                        guard_level: crate::model::GuardLevel::Green,
                        time: std::time::UNIX_EPOCH,
                    };
                    acct.recompute_drawdown();
                    out.push(acct);
                }
                Err(_) => break,
            }
            read = read.wrapping_add(1);
        }
        self.cursor(off::ACCT_READ).store(read, Ordering::Release);
        out
    }

    pub fn write_command(&mut self, cmd: &Command) -> bool {
        let write = self.cursor(off::CMD_WRITE).load(Ordering::Relaxed);
        let read = self.cursor(off::CMD_READ).load(Ordering::Acquire);
        if write.wrapping_sub(read) >= self.cmd_cap {
            return false;
        }
        let idx = (write % self.cmd_cap) as usize;
        let start = self.cmds_off + idx * COMMAND_ENTRY_SIZE;
        let wire = WireCommand::from_model(cmd);
        if wire
            .encode(&mut self.map[start..start + COMMAND_ENTRY_SIZE])
            .is_err()
        {
            return false;
        }
        self.cursor(off::CMD_WRITE)
            .store(write.wrapping_add(1), Ordering::Release);
        true
    }

    pub fn heartbeat(&self, now_ns: u64) {
        self.heartbeat_cell().store(now_ns, Ordering::Release);
    }

    pub fn ring_occupancy(&self, write_off: usize, read_off: usize, cap: u32) -> u32 {
        let write = self.cursor(write_off).load(Ordering::Relaxed);
        let read = self.cursor(read_off).load(Ordering::Relaxed);
        write.wrapping_sub(read).min(cap)
    }

    pub fn cmd_write_offset(&self) -> usize {
        off::CMD_WRITE
    }
    pub fn cmd_read_offset(&self) -> usize {
        off::CMD_READ
    }
    pub fn cmd_cap(&self) -> u32 {
        self.cmd_cap
    }
}

fn shm_path(name: &str) -> std::path::PathBuf {
    std::path::PathBuf::from("/dev/shm").join(name)
}
