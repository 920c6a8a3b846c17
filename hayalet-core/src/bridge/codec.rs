//! Fixed binary layout for the SHM header and its four ring entry kinds.
//!
//! Mirrors the wire format the terminal-side producer is assumed to speak:
//! little-endian integers, NUL-padded ASCII strings, no padding bytes
//! beyond natural 8-byte alignment. See spec §4.1/§6.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::model::{decode_fixed, encode_fixed, Side};

pub const SHM_VERSION: u32 = 3;
pub const SYMBOL_SIZE: usize = 16;
pub const ACCOUNT_SIZE: usize = 16;
pub const REASON_SIZE: usize = 32;

pub const TICK_ENTRY_SIZE: usize = 40;
pub const POSITION_ENTRY_SIZE: usize = 80;
pub const COMMAND_ENTRY_SIZE: usize = 128;
pub const ACCOUNT_ENTRY_SIZE: usize = 48;

/// The 13 u32 cursor/capacity fields plus the u64 heartbeat, decoded from
/// the front of the mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub tick_cap: u32,
    pub pos_cap: u32,
    pub cmd_cap: u32,
    pub acct_cap: u32,
    pub tick_write: u32,
    pub tick_read: u32,
    pub pos_write: u32,
    pub pos_read: u32,
    pub cmd_write: u32,
    pub cmd_read: u32,
    pub acct_write: u32,
    pub acct_read: u32,
    pub heartbeat: u64,
}

impl Header {
    pub fn new(tick_cap: u32, pos_cap: u32, cmd_cap: u32, acct_cap: u32) -> Self {
        Header {
            version: SHM_VERSION,
            tick_cap,
            pos_cap,
            cmd_cap,
            acct_cap,
            tick_write: 0,
            tick_read: 0,
            pos_write: 0,
            pos_read: 0,
            cmd_write: 0,
            cmd_read: 0,
            acct_write: 0,
            acct_read: 0,
            heartbeat: 0,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        let mut off = 0;
        for field in [
            self.version,
            self.tick_cap,
            self.pos_cap,
            self.cmd_cap,
            self.acct_cap,
            self.tick_write,
            self.tick_read,
            self.pos_write,
            self.pos_read,
            self.cmd_write,
            self.cmd_read,
            self.acct_write,
            self.acct_read,
        ] {
            buf[off..off + 4].copy_from_slice(&field.to_le_bytes());
            off += 4;
        }
        // 4 bytes of padding sit between the 13th u32 (ending at 52) and the
        // heartbeat u64, which needs 8-byte alignment (matches the Go
        // original's compiler-inserted struct padding).
        buf[HEARTBEAT_OFFSET..HEARTBEAT_OFFSET + 8].copy_from_slice(&self.heartbeat.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Header {
        let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Header {
            version: u32_at(0),
            tick_cap: u32_at(4),
            pos_cap: u32_at(8),
            cmd_cap: u32_at(12),
            acct_cap: u32_at(16),
            tick_write: u32_at(20),
            tick_read: u32_at(24),
            pos_write: u32_at(28),
            pos_read: u32_at(32),
            cmd_write: u32_at(36),
            cmd_read: u32_at(40),
            acct_write: u32_at(44),
            acct_read: u32_at(48),
            heartbeat: u64::from_le_bytes(
                buf[HEARTBEAT_OFFSET..HEARTBEAT_OFFSET + 8].try_into().unwrap(),
            ),
        }
    }
}

/// Offset of the heartbeat field: 13 u32 fields end at byte 52, which isn't
/// 8-byte aligned, so the Go original's compiler (and this layout, to stay
/// byte-compatible and to keep the `AtomicU64` view over it naturally
/// aligned) pads up to 56 before placing the `u64`.
pub const HEARTBEAT_OFFSET: usize = 56;

/// 13 u32 fields (52 bytes) + 4 bytes padding + one u64 (8 bytes) = 64 bytes.
pub const HEADER_BYTES: usize = HEARTBEAT_OFFSET + 8;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer too short: need {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
}

fn side_to_i32(side: Side) -> i32 {
    match side {
        Side::Sell => -1,
        Side::Buy => 1,
    }
}

fn side_from_i32(v: i32) -> Side {
    if v < 0 {
        Side::Sell
    } else {
        Side::Buy
    }
}

fn time_to_ns(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn time_from_ns(ns: i64) -> SystemTime {
    if ns >= 0 {
        UNIX_EPOCH + Duration::from_nanos(ns as u64)
    } else {
        UNIX_EPOCH
    }
}

/// A decoded tick ring entry (40 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireTick {
    pub symbol: [u8; SYMBOL_SIZE],
    pub bid: f64,
    pub ask: f64,
    pub time_ns: i64,
}

impl WireTick {
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), CodecError> {
        require_len(buf, TICK_ENTRY_SIZE)?;
        buf[0..16].copy_from_slice(&self.symbol);
        buf[16..24].copy_from_slice(&self.bid.to_le_bytes());
        buf[24..32].copy_from_slice(&self.ask.to_le_bytes());
        buf[32..40].copy_from_slice(&self.time_ns.to_le_bytes());
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<WireTick, CodecError> {
        require_len(buf, TICK_ENTRY_SIZE)?;
        let mut symbol = [0u8; SYMBOL_SIZE];
        symbol.copy_from_slice(&buf[0..16]);
        Ok(WireTick {
            symbol,
            bid: f64::from_le_bytes(buf[16..24].try_into().unwrap()),
            ask: f64::from_le_bytes(buf[24..32].try_into().unwrap()),
            time_ns: i64::from_le_bytes(buf[32..40].try_into().unwrap()),
        })
    }

    pub fn from_model(t: &crate::model::Tick) -> WireTick {
        WireTick {
            symbol: t.symbol,
            bid: t.bid,
            ask: t.ask,
            time_ns: time_to_ns(t.time),
        }
    }

    pub fn to_model(&self) -> crate::model::Tick {
        crate::model::Tick {
            symbol: self.symbol,
            bid: self.bid,
            ask: self.ask,
            time: time_from_ns(self.time_ns),
        }
    }
}

/// A decoded position ring entry (80 bytes on the wire — the field sum is
/// 76 bytes, padded to 80 for the struct's 8-byte alignment).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WirePosition {
    pub id: i64,
    pub symbol: [u8; SYMBOL_SIZE],
    pub side: i32,
    pub kind: i32,
    pub volume: f64,
    pub price: f64,
    pub time_ns: i64,
    pub magic: i32,
    pub account: [u8; ACCOUNT_SIZE],
}

impl WirePosition {
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), CodecError> {
        require_len(buf, POSITION_ENTRY_SIZE)?;
        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..24].copy_from_slice(&self.symbol);
        buf[24..28].copy_from_slice(&self.side.to_le_bytes());
        buf[28..32].copy_from_slice(&self.kind.to_le_bytes());
        buf[32..40].copy_from_slice(&self.volume.to_le_bytes());
        buf[40..48].copy_from_slice(&self.price.to_le_bytes());
        buf[48..56].copy_from_slice(&self.time_ns.to_le_bytes());
        buf[56..60].copy_from_slice(&self.magic.to_le_bytes());
        buf[60..76].copy_from_slice(&self.account);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<WirePosition, CodecError> {
        require_len(buf, POSITION_ENTRY_SIZE)?;
        let mut symbol = [0u8; SYMBOL_SIZE];
        symbol.copy_from_slice(&buf[8..24]);
        let mut account = [0u8; ACCOUNT_SIZE];
        account.copy_from_slice(&buf[60..76]);
        Ok(WirePosition {
            id: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
            symbol,
            side: i32::from_le_bytes(buf[24..28].try_into().unwrap()),
            kind: i32::from_le_bytes(buf[28..32].try_into().unwrap()),
            volume: f64::from_le_bytes(buf[32..40].try_into().unwrap()),
            price: f64::from_le_bytes(buf[40..48].try_into().unwrap()),
            time_ns: i64::from_le_bytes(buf[48..56].try_into().unwrap()),
            magic: i32::from_le_bytes(buf[56..60].try_into().unwrap()),
            account,
        })
    }

    pub fn to_model(&self) -> crate::model::Position {
        crate::model::Position {
            id: self.id,
            symbol: decode_fixed(&self.symbol),
            side: side_from_i32(self.side),
            volume: self.volume,
            price: self.price,
            open_time: time_from_ns(self.time_ns),
            magic: self.magic,
            account_id: decode_fixed(&self.account),
            pending: self.kind != 0,
            profit_loss: 0.0,
            swap: 0.0,
            comment: String::new(),
        }
    }
}

/// A decoded command ring entry (128 bytes on the wire). The 32-byte
/// `reason` field ends at byte 116, which isn't 8-byte aligned, so 4 bytes
/// of padding sit before the trailing `time_ns` (matches the Go original's
/// struct layout).
#[derive(Debug, Clone, PartialEq)]
pub struct WireCommand {
    pub kind: i32,
    pub symbol: [u8; SYMBOL_SIZE],
    pub side: i32,
    pub volume: f64,
    pub price: f64,
    pub tp: f64,
    pub sl: f64,
    pub ticket: i64,
    pub magic: i32,
    pub account: [u8; ACCOUNT_SIZE],
    pub reason: [u8; REASON_SIZE],
    pub time_ns: i64,
}

fn command_kind_to_i32(kind: crate::model::CommandType) -> i32 {
    use crate::model::CommandType::*;
    match kind {
        Open => 0,
        Close => 1,
        Modify => 2,
        Pause => 3,
        Resume => 4,
        HedgeAll => 5,
        CloseAll => 6,
        Freeze => 7,
    }
}

fn command_kind_from_i32(v: i32) -> crate::model::CommandType {
    use crate::model::CommandType::*;
    match v {
        1 => Close,
        2 => Modify,
        3 => Pause,
        4 => Resume,
        5 => HedgeAll,
        6 => CloseAll,
        7 => Freeze,
        _ => Open,
    }
}

impl WireCommand {
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), CodecError> {
        require_len(buf, COMMAND_ENTRY_SIZE)?;
        buf[0..4].copy_from_slice(&self.kind.to_le_bytes());
        buf[4..20].copy_from_slice(&self.symbol);
        buf[20..24].copy_from_slice(&self.side.to_le_bytes());
        buf[24..32].copy_from_slice(&self.volume.to_le_bytes());
        buf[32..40].copy_from_slice(&self.price.to_le_bytes());
        buf[40..48].copy_from_slice(&self.tp.to_le_bytes());
        buf[48..56].copy_from_slice(&self.sl.to_le_bytes());
        buf[56..64].copy_from_slice(&self.ticket.to_le_bytes());
        buf[64..68].copy_from_slice(&self.magic.to_le_bytes());
        buf[68..84].copy_from_slice(&self.account);
        buf[84..84 + REASON_SIZE].copy_from_slice(&self.reason);
        // buf[116..120] is alignment padding, left zeroed.
        buf[120..128].copy_from_slice(&self.time_ns.to_le_bytes());
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<WireCommand, CodecError> {
        require_len(buf, COMMAND_ENTRY_SIZE)?;
        let mut symbol = [0u8; SYMBOL_SIZE];
        symbol.copy_from_slice(&buf[4..20]);
        let mut account = [0u8; ACCOUNT_SIZE];
        account.copy_from_slice(&buf[68..84]);
        let mut reason = [0u8; REASON_SIZE];
        reason.copy_from_slice(&buf[84..84 + REASON_SIZE]);
        Ok(WireCommand {
            kind: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            symbol,
            side: i32::from_le_bytes(buf[20..24].try_into().unwrap()),
            volume: f64::from_le_bytes(buf[24..32].try_into().unwrap()),
            price: f64::from_le_bytes(buf[32..40].try_into().unwrap()),
            tp: f64::from_le_bytes(buf[40..48].try_into().unwrap()),
            sl: f64::from_le_bytes(buf[48..56].try_into().unwrap()),
            ticket: i64::from_le_bytes(buf[56..64].try_into().unwrap()),
            magic: i32::from_le_bytes(buf[64..68].try_into().unwrap()),
            account,
            reason,
            time_ns: i64::from_le_bytes(buf[120..128].try_into().unwrap()),
        })
    }

    pub fn from_model(cmd: &crate::model::Command) -> WireCommand {
        WireCommand {
            kind: command_kind_to_i32(cmd.kind),
            symbol: encode_fixed(&cmd.symbol),
            side: side_to_i32(cmd.side),
            volume: cmd.volume,
            price: cmd.price,
            tp: cmd.tp,
            sl: cmd.sl,
            ticket: cmd.ticket,
            magic: cmd.magic,
            account: encode_fixed(&cmd.account_id),
            reason: encode_fixed(&cmd.reason),
            time_ns: time_to_ns(cmd.time),
        }
    }

    pub fn to_model(&self) -> crate::model::Command {
        crate::model::Command {
            kind: command_kind_from_i32(self.kind),
            symbol: decode_fixed(&self.symbol),
            side: side_from_i32(self.side),
            volume: self.volume,
            price: self.price,
            tp: self.tp,
            sl: self.sl,
            ticket: self.ticket,
            magic: self.magic,
            account_id: decode_fixed(&self.account),
            reason: decode_fixed(&self.reason),
            time: time_from_ns(self.time_ns),
        }
    }
}

/// A decoded account ring entry (48 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireAccount {
    pub account: [u8; ACCOUNT_SIZE],
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub time_ns: i64,
}

impl WireAccount {
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), CodecError> {
        require_len(buf, ACCOUNT_ENTRY_SIZE)?;
        buf[0..16].copy_from_slice(&self.account);
        buf[16..24].copy_from_slice(&self.balance.to_le_bytes());
        buf[24..32].copy_from_slice(&self.equity.to_le_bytes());
        buf[32..40].copy_from_slice(&self.margin.to_le_bytes());
        buf[40..48].copy_from_slice(&self.time_ns.to_le_bytes());
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<WireAccount, CodecError> {
        require_len(buf, ACCOUNT_ENTRY_SIZE)?;
        let mut account = [0u8; ACCOUNT_SIZE];
        account.copy_from_slice(&buf[0..16]);
        Ok(WireAccount {
            account,
            balance: f64::from_le_bytes(buf[16..24].try_into().unwrap()),
            equity: f64::from_le_bytes(buf[24..32].try_into().unwrap()),
            margin: f64::from_le_bytes(buf[32..40].try_into().unwrap()),
            time_ns: i64::from_le_bytes(buf[40..48].try_into().unwrap()),
        })
    }

    pub fn account_id(&self) -> String {
        decode_fixed(&self.account)
    }
}

fn require_len(buf: &[u8], need: usize) -> Result<(), CodecError> {
    if buf.len() < need {
        Err(CodecError::TooShort { need, have: buf.len() })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_round_trip() {
        let h = Header::new(4096, 1024, 512, 64);
        let mut buf = [0u8; HEADER_BYTES];
        h.encode(&mut buf);
        assert_eq!(Header::decode(&buf), h);
    }

    /// A fixture with every cursor field nonzero, including `acct_read`
    /// (bytes 48-52, immediately before the heartbeat's alignment padding)
    /// so a wrong heartbeat offset that overlaps it would be caught.
    #[test]
    fn header_round_trip_with_nonzero_cursors_and_heartbeat() {
        let h = Header {
            version: SHM_VERSION,
            tick_cap: 4096,
            pos_cap: 1024,
            cmd_cap: 512,
            acct_cap: 64,
            tick_write: 111,
            tick_read: 222,
            pos_write: 333,
            pos_read: 444,
            cmd_write: 555,
            cmd_read: 666,
            acct_write: 777,
            acct_read: 0xFFFF_FFFF,
            heartbeat: 0x1122_3344_5566_7788,
        };
        let mut buf = [0u8; HEADER_BYTES];
        h.encode(&mut buf);
        assert_eq!(Header::decode(&buf), h);
    }

    #[test]
    fn entry_sizes_match_spec() {
        assert_eq!(TICK_ENTRY_SIZE, 40);
        assert_eq!(POSITION_ENTRY_SIZE, 80);
        assert_eq!(COMMAND_ENTRY_SIZE, 128);
        assert_eq!(ACCOUNT_ENTRY_SIZE, 48);
    }

    proptest! {
        #[test]
        fn tick_round_trip(bid in 0.0001f64..100000.0, ask in 0.0001f64..100000.0, ns in 0i64..i64::MAX) {
            let symbol: [u8; 16] = encode_fixed("EURUSD");
            let t = WireTick { symbol, bid, ask, time_ns: ns };
            let mut buf = [0u8; TICK_ENTRY_SIZE];
            t.encode(&mut buf).unwrap();
            let decoded = WireTick::decode(&buf).unwrap();
            prop_assert_eq!(decoded, t);
        }

        #[test]
        fn command_round_trip(volume in 0.01f64..100.0, magic in 0i32..10000) {
            let c = WireCommand {
                kind: 0,
                symbol: encode_fixed("GBPUSD"),
                side: 1,
                volume,
                price: 1.2345,
                tp: 1.25,
                sl: 1.2,
                ticket: 42,
                magic,
                account: encode_fixed("ACC1"),
                reason: encode_fixed("GRID_L1"),
                time_ns: 123456789,
            };
            let mut buf = [0u8; COMMAND_ENTRY_SIZE];
            c.encode(&mut buf).unwrap();
            let decoded = WireCommand::decode(&buf).unwrap();
            prop_assert_eq!(decoded, c);
        }
    }
}
