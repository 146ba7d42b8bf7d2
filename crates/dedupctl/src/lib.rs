#![warn(missing_docs)]

//! dedupctl: control surface for in-band (write time) deduplication and
//! content-based storage
//!
//! Flow: CLI args → options → validation → control record → backend exchange → status rendering

pub mod cli;
pub mod config;
pub mod error;
pub mod feature;
pub mod options;
pub mod params;
pub mod protocol;
pub mod size;
pub mod status;
pub mod transport;

pub use config::CtlConfig;
pub use error::{CtlError, Result};
pub use feature::{Cbs, Dedup, Feature, FeatureControl};
pub use options::{DedupConfigBuilder, RawCbsOptions, RawDedupOptions};
pub use params::{CbsConfig, DedupBackend, DedupConfig, HashAlgorithm};
pub use protocol::{CbsStatus, ControlCommand, CtlRecord, DedupStatus};
pub use status::RenderStatus;
pub use transport::{ControlChannel, FsHandle, MockBackend};
