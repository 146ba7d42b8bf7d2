//! Control protocol: command codes, the fixed-layout control record and its
//! request encoding / status decoding.
//!
//! The record is 512 bytes, native endian, shared by the dedup and CBS
//! features:
//!
//! | offset | width | field        |
//! |--------|-------|--------------|
//! | 0      | 2     | `cmd`        |
//! | 2      | 6     | padding      |
//! | 8      | 8     | `blocksize`  |
//! | 16     | 8     | `limit_nr`   |
//! | 24     | 8     | `limit_mem`  |
//! | 32     | 8     | `current_nr` |
//! | 40     | 2     | `backend`    |
//! | 42     | 2     | `hash_type`  |
//! | 44     | 1     | `status`     |
//! | 45     | 467   | reserved     |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CtlError, Result};
use crate::params::{CbsConfig, DedupConfig};

/// Size of the control record in bytes.
pub const CTL_RECORD_SIZE: usize = 512;

/// Filesystem ioctl magic.
pub const IOCTL_MAGIC: u32 = 0x94;
/// ioctl number of the dedup control request.
pub const DEDUP_CTL_NR: u32 = 55;
/// ioctl number of the CBS control request.
pub const CBS_CTL_NR: u32 = 56;

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

/// Encode a read/write ioctl request number (`_IOWR`).
pub const fn iowr(ty: u32, nr: u32, size: usize) -> u64 {
    ((IOC_READ | IOC_WRITE) << 30) | ((size as u64) << 16) | ((ty as u64) << 8) | nr as u64
}

/// Request number for dedup control exchanges.
pub const DEDUP_CTL_REQUEST: u64 = iowr(IOCTL_MAGIC, DEDUP_CTL_NR, CTL_RECORD_SIZE);
/// Request number for CBS control exchanges.
pub const CBS_CTL_REQUEST: u64 = iowr(IOCTL_MAGIC, CBS_CTL_NR, CTL_RECORD_SIZE);

/// Command code carried in `cmd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CommandCode {
    /// Turn the feature on with the supplied parameters.
    Enable = 1,
    /// Turn the feature off.
    Disable = 2,
    /// Report current state.
    Status = 3,
}

impl CommandCode {
    /// Map a raw `cmd` value back.
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(CommandCode::Enable),
            2 => Some(CommandCode::Disable),
            3 => Some(CommandCode::Status),
            _ => None,
        }
    }
}

/// A request to the backend. Built once per invocation and consumed by
/// exactly one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand<C> {
    /// Enable with parameters.
    Enable(C),
    /// Disable; idempotent on the backend.
    Disable,
    /// Query status; never changes backend state.
    StatusQuery,
}

impl<C> ControlCommand<C> {
    /// Wire command code.
    pub fn code(&self) -> CommandCode {
        match self {
            ControlCommand::Enable(_) => CommandCode::Enable,
            ControlCommand::Disable => CommandCode::Disable,
            ControlCommand::StatusQuery => CommandCode::Status,
        }
    }
}

/// The control record exchanged with the backend.
#[repr(C, align(8))]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CtlRecord {
    /// Command code (in).
    pub cmd: u16,
    pad: [u8; 6],
    /// Dedup block size (in/out).
    pub blocksize: u64,
    /// In-memory hash count limit (in/out).
    pub limit_nr: u64,
    /// In-memory hash memory limit (in/out).
    pub limit_mem: u64,
    /// Current number of stored hashes (out).
    pub current_nr: u64,
    /// Backend tag (in/out).
    pub backend: u16,
    /// Hash algorithm tag (in/out).
    pub hash_type: u16,
    /// 0 when disabled (out).
    pub status: u8,
    reserved: [u8; 467],
}

const _: () = assert!(std::mem::size_of::<CtlRecord>() == CTL_RECORD_SIZE);

impl CtlRecord {
    /// An all-zero record.
    pub fn zeroed() -> Self {
        Self {
            cmd: 0,
            pad: [0; 6],
            blocksize: 0,
            limit_nr: 0,
            limit_mem: 0,
            current_nr: 0,
            backend: 0,
            hash_type: 0,
            status: 0,
            reserved: [0; 467],
        }
    }

    /// A zeroed record carrying only a command code.
    pub fn with_command(code: CommandCode) -> Self {
        Self {
            cmd: code as u16,
            ..Self::zeroed()
        }
    }

    /// Encode a command for a feature whose parameters know their wire form.
    pub fn encode<C: WireParams>(command: &ControlCommand<C>) -> Self {
        let mut record = Self::with_command(command.code());
        if let ControlCommand::Enable(params) = command {
            params.encode_into(&mut record);
        }
        record
    }

    /// Decoded command code, if recognized.
    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::from_raw(self.cmd)
    }

    /// True when the backend reports the feature enabled.
    pub fn is_enabled(&self) -> bool {
        self.status != 0
    }

    /// Serialize to the exact wire bytes. For inspection and tests; the
    /// transport passes the `#[repr(C)]` value itself.
    pub fn to_bytes(&self) -> [u8; CTL_RECORD_SIZE] {
        let mut buf = [0u8; CTL_RECORD_SIZE];
        buf[0..2].copy_from_slice(&self.cmd.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.blocksize.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.limit_nr.to_ne_bytes());
        buf[24..32].copy_from_slice(&self.limit_mem.to_ne_bytes());
        buf[32..40].copy_from_slice(&self.current_nr.to_ne_bytes());
        buf[40..42].copy_from_slice(&self.backend.to_ne_bytes());
        buf[42..44].copy_from_slice(&self.hash_type.to_ne_bytes());
        buf[44] = self.status;
        buf
    }

    /// Parse wire bytes, e.g. a captured request. Padding and reserved bytes
    /// are ignored. The transport never goes through this.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != CTL_RECORD_SIZE {
            return Err(CtlError::Transport {
                action: "decode control record".to_string(),
                reason: format!("expected {} bytes, got {}", CTL_RECORD_SIZE, buf.len()),
            });
        }
        Ok(Self {
            cmd: u16::from_ne_bytes([buf[0], buf[1]]),
            blocksize: read_u64(buf, 8),
            limit_nr: read_u64(buf, 16),
            limit_mem: read_u64(buf, 24),
            current_nr: read_u64(buf, 32),
            backend: u16::from_ne_bytes([buf[40], buf[41]]),
            hash_type: u16::from_ne_bytes([buf[42], buf[43]]),
            status: buf[44],
            ..Self::zeroed()
        })
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_ne_bytes(word)
}

impl Default for CtlRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for CtlRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtlRecord")
            .field("cmd", &self.cmd)
            .field("blocksize", &self.blocksize)
            .field("limit_nr", &self.limit_nr)
            .field("limit_mem", &self.limit_mem)
            .field("current_nr", &self.current_nr)
            .field("backend", &self.backend)
            .field("hash_type", &self.hash_type)
            .field("status", &self.status)
            .finish()
    }
}

/// Parameters that can be written into an enable record.
pub trait WireParams {
    /// Fill the parameter fields of `record`. `cmd` is already set.
    fn encode_into(&self, record: &mut CtlRecord);
}

impl WireParams for DedupConfig {
    fn encode_into(&self, record: &mut CtlRecord) {
        record.blocksize = self.block_size;
        record.hash_type = self.hash_algorithm.tag();
        record.limit_nr = self.limit_count;
        record.limit_mem = self.limit_memory;
        record.backend = self.backend.tag();
    }
}

impl WireParams for CbsConfig {
    fn encode_into(&self, record: &mut CtlRecord) {
        record.hash_type = self.hash_algorithm.tag();
    }
}

/// A status report that can be read out of a response record.
pub trait WireStatus: Sized {
    /// Decode the response fields.
    fn decode(record: &CtlRecord) -> Self;
}

/// Dedup status as reported by the backend. Tags stay raw so unknown values
/// reach the renderer intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStatus {
    /// Feature is on.
    pub enabled: bool,
    /// Hash algorithm tag.
    pub hash_type: u16,
    /// Dedup block size.
    pub block_size: u64,
    /// Backend tag.
    pub backend: u16,
    /// Hashes currently stored.
    pub current_count: u64,
    /// Effective hash count limit.
    pub limit_count: u64,
    /// Effective memory limit.
    pub limit_memory: u64,
}

impl WireStatus for DedupStatus {
    fn decode(record: &CtlRecord) -> Self {
        Self {
            enabled: record.is_enabled(),
            hash_type: record.hash_type,
            block_size: record.blocksize,
            backend: record.backend,
            current_count: record.current_nr,
            limit_count: record.limit_nr,
            limit_memory: record.limit_mem,
        }
    }
}

/// CBS status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbsStatus {
    /// Feature is on.
    pub enabled: bool,
    /// Hash algorithm tag.
    pub hash_type: u16,
}

impl WireStatus for CbsStatus {
    fn decode(record: &CtlRecord) -> Self {
        Self {
            enabled: record.is_enabled(),
            hash_type: record.hash_type,
        }
    }
}
