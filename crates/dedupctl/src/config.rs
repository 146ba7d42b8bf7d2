use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CtlError, Result};
use crate::options::DedupConfigBuilder;
use crate::params::{DedupBackend, DedupConfig, HashAlgorithm, BLOCKSIZE_DEFAULT};
use crate::size::parse_size;

/// Defaults for `dedup enable` and global switches, loaded from a TOML or
/// JSON file. Sizes are size literals (`"64K"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    pub hash_algorithm: HashAlgorithm,
    pub blocksize: String,
    pub backend: DedupBackend,
    pub limit_hash: Option<String>,
    pub limit_memory: Option<String>,
    pub dry_run: bool,
}

impl Default for CtlConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            blocksize: format!("{}K", BLOCKSIZE_DEFAULT / 1024),
            backend: DedupBackend::InMemory,
            limit_hash: None,
            limit_memory: None,
            dry_run: false,
        }
    }
}

impl CtlConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CtlError::Config(format!("{}: {}", path.display(), e)))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| CtlError::Config(format!("{}: {}", path.display(), e))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| CtlError::Config(format!("{}: {}", path.display(), e))),
            _ => Err(CtlError::Config(format!(
                "unsupported config file extension: {}",
                ext
            ))),
        }
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::from_file(path),
            Some(path) => {
                tracing::warn!("Config file not found, using defaults: {}", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Starting point for `dedup enable` option parsing. Size literals are
    /// parsed here; legality is checked only after the flags are applied.
    pub fn dedup_defaults(&self) -> Result<DedupConfigBuilder> {
        let mut builder = DedupConfigBuilder::from_defaults(DedupConfig::default())
            .hash_algorithm(self.hash_algorithm)
            .block_size(parse_size(&self.blocksize)?)
            .backend(self.backend);
        if let Some(ref limit) = self.limit_hash {
            builder = builder.limit_count(parse_size(limit)?);
        }
        if let Some(ref limit) = self.limit_memory {
            builder = builder.limit_memory(parse_size(limit)?);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = CtlConfig::default();
        assert_eq!(config.blocksize, "32K");
        assert_eq!(config.backend, DedupBackend::InMemory);
        assert!(config.limit_hash.is_none());
        assert!(!config.dry_run);
        let dedup = config.dedup_defaults().unwrap().build().unwrap();
        assert_eq!(dedup, DedupConfig::default());
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = CtlConfig {
            hash_algorithm: HashAlgorithm::Sha256,
            blocksize: String::from("1M"),
            backend: DedupBackend::OnDisk,
            limit_hash: None,
            limit_memory: None,
            dry_run: true,
        };

        let json = serde_json::to_string(&config).unwrap();
        let decoded: CtlConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, decoded);
        assert!(json.contains("\"ondisk\""));
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{
                "blocksize": "128K",
                "backend": "inmemory",
                "limit_memory": "64M"
            }}"#
        )
        .unwrap();

        let config = CtlConfig::from_file(file.path()).unwrap();
        let dedup = config.dedup_defaults().unwrap().build().unwrap();
        assert_eq!(dedup.block_size, 128 * 1024);
        assert_eq!(dedup.limit_memory, 64 << 20);
        assert_eq!(dedup.limit_count, 0);
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
hash_algorithm = "sha256"
blocksize = "64K"
backend = "ondisk"
dry_run = true
            "#
        )
        .unwrap();

        let config = CtlConfig::from_file(file.path()).unwrap();
        assert!(config.dry_run);
        let dedup = config.dedup_defaults().unwrap().build().unwrap();
        assert_eq!(dedup.backend, DedupBackend::OnDisk);
        assert_eq!(dedup.block_size, 65536);
    }

    #[test]
    fn test_unknown_backend_in_file_rejected() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, r#"backend = "tape""#).unwrap();
        assert!(matches!(
            CtlConfig::from_file(file.path()),
            Err(CtlError::Config(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        let err = CtlConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config file extension"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            CtlConfig::load_or_default(Some(Path::new("/nonexistent/dedupctl.toml"))).unwrap();
        assert_eq!(config, CtlConfig::default());
    }

    #[test]
    fn test_bad_size_in_file_is_parse_error() {
        let config = CtlConfig {
            blocksize: String::from("lots"),
            ..CtlConfig::default()
        };
        assert!(matches!(config.dedup_defaults(), Err(CtlError::Parse(_))));
    }
}
