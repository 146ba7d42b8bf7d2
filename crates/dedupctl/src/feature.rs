//! Generic feature control: enable / disable / status for any feature that
//! speaks the control protocol.

use std::fmt;
use std::io;
use std::marker::PhantomData;

use tracing::{debug, info};

use crate::error::{CtlError, Result};
use crate::params::{CbsConfig, DedupBackend, DedupConfig};
use crate::protocol::{
    CbsStatus, ControlCommand, CtlRecord, DedupStatus, WireParams, WireStatus, CBS_CTL_REQUEST,
    DEDUP_CTL_REQUEST,
};
use crate::status::RenderStatus;
use crate::transport::ControlChannel;

/// Message shown when the on-disk backend is requested on a filesystem that
/// was created without the on-disk dedup feature.
pub const ONDISK_UNSUPPORTED_MSG: &str = "requires an on-disk-dedup-capable filesystem";

/// A backend feature controlled through the shared control record.
pub trait Feature {
    /// Parameters accepted on enable.
    type Config: WireParams + Copy + fmt::Debug;
    /// Decoded status report.
    type Status: WireStatus + RenderStatus + fmt::Debug;

    /// Command group name.
    const NAME: &'static str;
    /// What the error messages call this feature.
    const SUBJECT: &'static str;
    /// ioctl request number.
    const REQUEST: u64;

    /// Cross-field validation, run before any backend contact.
    fn validate(config: &Self::Config) -> Result<()>;

    /// Replace the generic OS error text for known enable failures.
    fn enable_failure_hint(_config: &Self::Config, _err: &io::Error) -> Option<&'static str> {
        None
    }
}

/// Full in-band deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dedup;

impl Feature for Dedup {
    type Config = DedupConfig;
    type Status = DedupStatus;

    const NAME: &'static str = "dedup";
    const SUBJECT: &'static str = "inband deduplication";
    const REQUEST: u64 = DEDUP_CTL_REQUEST;

    fn validate(config: &DedupConfig) -> Result<()> {
        config.validate()
    }

    fn enable_failure_hint(config: &DedupConfig, err: &io::Error) -> Option<&'static str> {
        if config.backend == DedupBackend::OnDisk && err.raw_os_error() == Some(libc::EOPNOTSUPP) {
            Some(ONDISK_UNSUPPORTED_MSG)
        } else {
            None
        }
    }
}

/// Content-based storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cbs;

impl Feature for Cbs {
    type Config = CbsConfig;
    type Status = CbsStatus;

    const NAME: &'static str = "cbs";
    const SUBJECT: &'static str = "cbs";
    const REQUEST: u64 = CBS_CTL_REQUEST;

    fn validate(config: &CbsConfig) -> Result<()> {
        config.validate()
    }
}

/// OS error text without the `(os error N)` suffix.
pub fn os_error_text(err: &io::Error) -> String {
    let text = err.to_string();
    match text.find(" (os error ") {
        Some(idx) => text[..idx].to_string(),
        None => text,
    }
}

/// Drives one feature over one control channel.
pub struct FeatureControl<F: Feature, C: ControlChannel> {
    channel: C,
    feature: PhantomData<F>,
}

impl<F: Feature, C: ControlChannel> FeatureControl<F, C> {
    /// Bind a feature to a channel.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            feature: PhantomData,
        }
    }

    /// Give the channel back, e.g. to release the handle early.
    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Validate and enable. Nothing is sent if validation fails.
    pub fn enable(&mut self, config: F::Config) -> Result<()> {
        F::validate(&config)?;
        let command = ControlCommand::Enable(config);
        self.send(&command).map_err(|err| {
            let reason = F::enable_failure_hint(&config, &err)
                .map(str::to_string)
                .unwrap_or_else(|| os_error_text(&err));
            CtlError::Transport {
                action: format!("enable {}", F::SUBJECT),
                reason,
            }
        })?;
        info!(feature = F::NAME, ?config, "enabled");
        Ok(())
    }

    /// Disable. The backend treats repeated disables as no-ops.
    pub fn disable(&mut self) -> Result<()> {
        self.send(&ControlCommand::Disable)
            .map_err(|err| CtlError::Transport {
                action: format!("disable {}", F::SUBJECT),
                reason: os_error_text(&err),
            })?;
        info!(feature = F::NAME, "disabled");
        Ok(())
    }

    /// Query the current state.
    pub fn status(&mut self) -> Result<F::Status> {
        let record = self
            .send(&ControlCommand::StatusQuery)
            .map_err(|err| CtlError::Transport {
                action: format!("get {} status", F::SUBJECT),
                reason: os_error_text(&err),
            })?;
        let status = F::Status::decode(&record);
        debug!(feature = F::NAME, ?status, "status");
        Ok(status)
    }

    /// Run any command; status queries return their report.
    pub fn execute(&mut self, command: ControlCommand<F::Config>) -> Result<Option<F::Status>> {
        match command {
            ControlCommand::Enable(config) => self.enable(config).map(|_| None),
            ControlCommand::Disable => self.disable().map(|_| None),
            ControlCommand::StatusQuery => self.status().map(Some),
        }
    }

    fn send(&mut self, command: &ControlCommand<F::Config>) -> io::Result<CtlRecord> {
        let mut record = CtlRecord::encode(command);
        debug!(feature = F::NAME, code = ?command.code(), ?record, "sending control record");
        self.channel.exchange(F::REQUEST, &mut record)?;
        Ok(record)
    }
}
