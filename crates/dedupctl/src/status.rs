//! Status rendering. Pure: the same report always yields the same lines.

use crate::params::{DedupBackend, HashAlgorithm};
use crate::protocol::{CbsStatus, DedupStatus};
use crate::size::pretty_size;

/// Placeholder for a value the report does not allow us to compute.
pub const UNKNOWN: &str = "unknown";

/// Human-readable rendering of a status report.
pub trait RenderStatus {
    /// One entry per output line, without trailing newlines.
    fn render(&self) -> Vec<String>;
}

fn disabled() -> Vec<String> {
    vec!["Status:\t\t\tDisabled".to_string()]
}

fn hash_line(tag: u16) -> String {
    match HashAlgorithm::from_tag(tag) {
        Some(algo) => format!("Hash algorithm:\t\t{}", algo.display_name()),
        None => format!("Hash algorithm:\t\tUnrecognized({:x})", tag),
    }
}

/// Estimated hash memory in use, `None` when the per-hash cost cannot be
/// derived because the count limit is zero.
pub fn estimated_memory(current_count: u64, limit_count: u64, limit_memory: u64) -> Option<u64> {
    let per_hash = limit_memory.checked_div(limit_count)?;
    Some(current_count.saturating_mul(per_hash))
}

impl RenderStatus for CbsStatus {
    fn render(&self) -> Vec<String> {
        if !self.enabled {
            return disabled();
        }
        vec!["Status:\t\t\tEnabled".to_string(), hash_line(self.hash_type)]
    }
}

impl RenderStatus for DedupStatus {
    fn render(&self) -> Vec<String> {
        if !self.enabled {
            return disabled();
        }

        let mut lines = vec!["Status:\t\t\tEnabled".to_string(), hash_line(self.hash_type)];

        let backend = DedupBackend::from_tag(self.backend);
        lines.push(match backend {
            Some(b) => format!("Backend:\t\t{}", b.display_name()),
            None => format!("Backend:\t\tUnrecognized({:x})", self.backend),
        });
        lines.push(format!("Dedup Blocksize:\t{}", self.block_size));

        if backend == Some(DedupBackend::InMemory) {
            lines.push(format!(
                "Number of hash: \t[{}/{}]",
                self.current_count, self.limit_count
            ));
            let used = estimated_memory(self.current_count, self.limit_count, self.limit_memory)
                .map(pretty_size)
                .unwrap_or_else(|| UNKNOWN.to_string());
            lines.push(format!(
                "Memory usage: \t\t[{}/{}]",
                used,
                pretty_size(self.limit_memory)
            ));
        }

        lines
    }
}
