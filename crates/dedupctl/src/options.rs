//! Option parsing: raw flag values into feature parameters.
//!
//! Values are accumulated in an immutable builder. Each setter consumes the
//! builder and returns a new one; [`DedupConfigBuilder::build`] validates once
//! at the end.

use crate::error::Result;
use crate::params::{CbsConfig, DedupBackend, DedupConfig, HashAlgorithm};
use crate::size::parse_size;

/// Raw `dedup enable` option values, exactly as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDedupOptions {
    /// `-s|--storage-backend`
    pub storage_backend: Option<String>,
    /// `-b|--blocksize`
    pub blocksize: Option<String>,
    /// `-a|--hash-algorithm`
    pub hash_algorithm: Option<String>,
    /// `-l|--limit-hash`
    pub limit_hash: Option<String>,
    /// `-m|--limit-memory`
    pub limit_memory: Option<String>,
}

/// Raw `cbs enable` option values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCbsOptions {
    /// `-a|--hash-algorithm`
    pub hash_algorithm: Option<String>,
}

/// Immutable accumulator for [`DedupConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct DedupConfigBuilder {
    config: DedupConfig,
}

impl Default for DedupConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupConfigBuilder {
    /// Start from the built-in defaults.
    pub fn new() -> Self {
        Self::from_defaults(DedupConfig::default())
    }

    /// Start from caller-supplied defaults, e.g. a configuration file.
    pub fn from_defaults(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Set the hash algorithm.
    pub fn hash_algorithm(self, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            config: DedupConfig {
                hash_algorithm,
                ..self.config
            },
        }
    }

    /// Set the dedup block size in bytes.
    pub fn block_size(self, block_size: u64) -> Self {
        Self {
            config: DedupConfig {
                block_size,
                ..self.config
            },
        }
    }

    /// Set the hash storage backend.
    pub fn backend(self, backend: DedupBackend) -> Self {
        Self {
            config: DedupConfig {
                backend,
                ..self.config
            },
        }
    }

    /// Set the in-memory hash count limit.
    pub fn limit_count(self, limit_count: u64) -> Self {
        Self {
            config: DedupConfig {
                limit_count,
                ..self.config
            },
        }
    }

    /// Set the in-memory hash memory limit.
    pub fn limit_memory(self, limit_memory: u64) -> Self {
        Self {
            config: DedupConfig {
                limit_memory,
                ..self.config
            },
        }
    }

    /// Drop both in-memory limits.
    pub fn clear_limits(self) -> Self {
        self.limit_count(0).limit_memory(0)
    }

    /// The accumulated value, not yet validated.
    pub fn peek(&self) -> &DedupConfig {
        &self.config
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<DedupConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse `dedup enable` options on top of `base`. Unknown enum values and
/// malformed sizes fail immediately; cross-field rules are left to
/// [`DedupConfigBuilder::build`].
///
/// The two limits are one setting: a `-l` or `-m` flag replaces both limits
/// from `base`, and an explicit on-disk backend drops them.
pub fn parse_dedup_options(
    raw: &RawDedupOptions,
    base: DedupConfigBuilder,
) -> Result<DedupConfigBuilder> {
    let mut builder = base;
    if let Some(ref value) = raw.storage_backend {
        let backend: DedupBackend = value.parse()?;
        if backend == DedupBackend::OnDisk {
            builder = builder.clear_limits();
        }
        builder = builder.backend(backend);
    }
    if raw.limit_hash.is_some() || raw.limit_memory.is_some() {
        builder = builder.clear_limits();
    }
    if let Some(ref value) = raw.blocksize {
        builder = builder.block_size(parse_size(value)?);
    }
    if let Some(ref value) = raw.hash_algorithm {
        builder = builder.hash_algorithm(value.parse()?);
    }
    if let Some(ref value) = raw.limit_hash {
        builder = builder.limit_count(parse_size(value)?);
    }
    if let Some(ref value) = raw.limit_memory {
        builder = builder.limit_memory(parse_size(value)?);
    }
    Ok(builder)
}

/// Parse `cbs enable` options.
pub fn parse_cbs_options(raw: &RawCbsOptions) -> Result<CbsConfig> {
    let mut config = CbsConfig::default();
    if let Some(ref value) = raw.hash_algorithm {
        config.hash_algorithm = value.parse()?;
    }
    Ok(config)
}
