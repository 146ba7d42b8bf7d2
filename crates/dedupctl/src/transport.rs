//! Backend transport: one synchronous exchange of a control record.
//!
//! [`ControlChannel`] is the seam. [`FsHandle`] issues the real ioctl on an
//! open file or directory; [`MockBackend`] keeps the backend state machine in
//! memory for tests and dry runs.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CtlError, Result};
use crate::params::{validate_block_size, DedupBackend, LIMIT_NR_DEFAULT};
use crate::protocol::{CommandCode, CtlRecord, DEDUP_CTL_REQUEST};

/// A control channel to the backend bound to one filesystem.
pub trait ControlChannel {
    /// Send `record` with the given request number; on success the backend's
    /// response has been written back into `record`.
    fn exchange(&mut self, request: u64, record: &mut CtlRecord) -> io::Result<()>;
}

impl<T: ControlChannel + ?Sized> ControlChannel for &mut T {
    fn exchange(&mut self, request: u64, record: &mut CtlRecord) -> io::Result<()> {
        (**self).exchange(request, record)
    }
}

/// An open handle on a file or directory inside the target filesystem.
/// Closed when dropped.
#[derive(Debug)]
pub struct FsHandle {
    path: PathBuf,
    file: File,
}

impl FsHandle {
    /// Open `path` read-only. Directories are accepted.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| CtlError::Resource {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), fd = file.as_raw_fd(), "opened filesystem handle");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path this handle was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ControlChannel for FsHandle {
    fn exchange(&mut self, request: u64, record: &mut CtlRecord) -> io::Result<()> {
        debug!(request = %format_args!("{:#x}", request), ?record, "control request");
        // SAFETY: `record` is a live, exclusively borrowed #[repr(C)] value of
        // exactly the size encoded in `request`; the fd is owned by `self`.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                request as _,
                record as *mut CtlRecord as *mut libc::c_void,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            debug!(error = %err, "control request failed");
            return Err(err);
        }
        debug!(?record, "control response");
        Ok(())
    }
}

/// Per-hash memory cost the in-memory backend model charges.
pub const MOCK_HASH_ENTRY_SIZE: u64 = 112;

/// Backend state for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendState {
    /// Feature off.
    #[default]
    Disabled,
    /// Feature on with the parameters it was enabled with. `current_nr`
    /// holds the feature's own hash count.
    Enabled(CtlRecord),
}

/// In-memory backend implementing the enable / disable / status state
/// machine for every request number it sees.
#[derive(Debug, Default)]
pub struct MockBackend {
    states: HashMap<u64, BackendState>,
    exchanges: Vec<(u64, CtlRecord)>,
    ondisk_unsupported: bool,
    fail_next: Option<i32>,
}

impl MockBackend {
    /// A backend with every feature disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Model a filesystem created without the on-disk dedup feature.
    pub fn without_ondisk_support(mut self) -> Self {
        self.ondisk_unsupported = true;
        self
    }

    /// Make the next exchange fail with `errno`.
    pub fn fail_next_with(&mut self, errno: i32) {
        self.fail_next = Some(errno);
    }

    /// Simulate hashes accumulated by writes for the feature behind
    /// `request`. Ignored while that feature is disabled.
    pub fn set_current_count(&mut self, request: u64, count: u64) {
        if let Some(BackendState::Enabled(params)) = self.states.get_mut(&request) {
            params.current_nr = count;
        }
    }

    /// Every request received so far, as sent.
    pub fn exchanges(&self) -> &[(u64, CtlRecord)] {
        &self.exchanges
    }

    /// Current state for a request number.
    pub fn state(&self, request: u64) -> BackendState {
        self.states.get(&request).copied().unwrap_or_default()
    }

    fn enable(&mut self, request: u64, record: &CtlRecord) -> io::Result<()> {
        let mut params = *record;
        params.current_nr = 0;
        if request == DEDUP_CTL_REQUEST {
            if validate_block_size(params.blocksize).is_err() {
                return Err(io::Error::from_raw_os_error(libc::EINVAL));
            }
            match DedupBackend::from_tag(params.backend) {
                Some(DedupBackend::OnDisk) if self.ondisk_unsupported => {
                    return Err(io::Error::from_raw_os_error(libc::EOPNOTSUPP));
                }
                Some(DedupBackend::InMemory) => {
                    if params.limit_nr == 0 && params.limit_mem == 0 {
                        params.limit_nr = LIMIT_NR_DEFAULT;
                    }
                    if params.limit_nr == 0 {
                        params.limit_nr = params.limit_mem / MOCK_HASH_ENTRY_SIZE;
                    } else {
                        params.limit_mem = params.limit_nr.saturating_mul(MOCK_HASH_ENTRY_SIZE);
                    }
                }
                Some(DedupBackend::OnDisk) => {}
                None => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
            }
        }
        let previous = self.states.insert(request, BackendState::Enabled(params));
        if matches!(previous, Some(BackendState::Enabled(_))) {
            info!(request = %format_args!("{:#x}", request), "backend reconfigured");
        }
        Ok(())
    }

    fn fill_status(&self, request: u64, record: &mut CtlRecord) {
        *record = CtlRecord::with_command(CommandCode::Status);
        if let BackendState::Enabled(params) = self.state(request) {
            record.status = 1;
            record.hash_type = params.hash_type;
            record.blocksize = params.blocksize;
            record.backend = params.backend;
            record.limit_nr = params.limit_nr;
            record.limit_mem = params.limit_mem;
            record.current_nr = params.current_nr;
        }
    }
}

impl ControlChannel for MockBackend {
    fn exchange(&mut self, request: u64, record: &mut CtlRecord) -> io::Result<()> {
        self.exchanges.push((request, *record));
        if let Some(errno) = self.fail_next.take() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        match record.command() {
            Some(CommandCode::Enable) => self.enable(request, record),
            Some(CommandCode::Disable) => {
                self.states.insert(request, BackendState::Disabled);
                Ok(())
            }
            Some(CommandCode::Status) => {
                self.fill_status(request, record);
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }
}
