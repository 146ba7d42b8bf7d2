//! Feature parameters sent to the backend on enable, and their legality rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CtlError, Result};

/// Smallest accepted dedup block size.
pub const BLOCKSIZE_MIN: u64 = 16 * 1024;
/// Largest accepted dedup block size.
pub const BLOCKSIZE_MAX: u64 = 8 * 1024 * 1024;
/// Block size used when none is given.
pub const BLOCKSIZE_DEFAULT: u64 = 32 * 1024;
/// Hash count the in-memory backend uses when `limit_count` is 0.
pub const LIMIT_NR_DEFAULT: u64 = 32 * 1024;

/// Hash algorithm used to fingerprint blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum HashAlgorithm {
    /// SHA-256, the only algorithm the backend implements.
    #[default]
    Sha256 = 0,
}

impl HashAlgorithm {
    /// Wire tag.
    pub fn tag(self) -> u16 {
        self as u16
    }

    /// Map a wire tag back, `None` if the backend reports something unknown.
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }

    /// Name shown in status output.
    pub fn display_name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = CtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(CtlError::Parse(format!(
                "unsupported hash algorithm: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

/// Where the dedup hash index lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum DedupBackend {
    /// Fast, lost on unmount.
    #[default]
    InMemory = 0,
    /// Persistent, needs the on-disk dedup filesystem feature.
    OnDisk = 1,
}

impl DedupBackend {
    /// Wire tag.
    pub fn tag(self) -> u16 {
        self as u16
    }

    /// Map a wire tag back, `None` if unknown.
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(DedupBackend::InMemory),
            1 => Some(DedupBackend::OnDisk),
            _ => None,
        }
    }

    /// Name shown in status output.
    pub fn display_name(self) -> &'static str {
        match self {
            DedupBackend::InMemory => "In-memory",
            DedupBackend::OnDisk => "On-disk",
        }
    }
}

impl FromStr for DedupBackend {
    type Err = CtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inmemory" => Ok(DedupBackend::InMemory),
            "ondisk" => Ok(DedupBackend::OnDisk),
            other => Err(CtlError::Parse(format!(
                "unsupported dedup backend: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DedupBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupBackend::InMemory => f.write_str("inmemory"),
            DedupBackend::OnDisk => f.write_str("ondisk"),
        }
    }
}

/// Parameters of the full dedup feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Fingerprint algorithm.
    pub hash_algorithm: HashAlgorithm,
    /// Dedup block size in bytes.
    pub block_size: u64,
    /// Hash index storage.
    pub backend: DedupBackend,
    /// Maximum number of hashes kept in memory, 0 for the backend default.
    pub limit_count: u64,
    /// Maximum bytes of memory for hashes, 0 for no memory limit.
    pub limit_memory: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            block_size: BLOCKSIZE_DEFAULT,
            backend: DedupBackend::InMemory,
            limit_count: 0,
            limit_memory: 0,
        }
    }
}

impl DedupConfig {
    /// Check cross-field legality. Rules run in a fixed order so the
    /// reported message is deterministic.
    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)?;

        if self.limit_count != 0 && self.limit_memory != 0 {
            return Err(CtlError::Validation(
                "limit-memory and limit-hash can't be given at the same time".to_string(),
            ));
        }

        if (self.limit_count != 0 || self.limit_memory != 0)
            && self.backend == DedupBackend::OnDisk
        {
            return Err(CtlError::Validation(
                "limit is only valid for in-memory backend".to_string(),
            ));
        }

        Ok(())
    }
}

/// Block size must be a power of two within `[BLOCKSIZE_MIN, BLOCKSIZE_MAX]`.
pub fn validate_block_size(block_size: u64) -> Result<()> {
    if !block_size.is_power_of_two()
        || block_size < BLOCKSIZE_MIN
        || block_size > BLOCKSIZE_MAX
    {
        return Err(CtlError::Validation(format!(
            "invalid dedup blocksize: {}, not in range [{},{}] or power of 2",
            block_size, BLOCKSIZE_MIN, BLOCKSIZE_MAX
        )));
    }
    Ok(())
}

/// Parameters of the content-based storage feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CbsConfig {
    /// Fingerprint algorithm.
    pub hash_algorithm: HashAlgorithm,
}

impl CbsConfig {
    /// CBS has a single field whose only legal value is enforced when parsing.
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
