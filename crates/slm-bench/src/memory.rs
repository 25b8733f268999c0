//! Best-effort process memory sampling.
//!
//! Reads `VmRSS` (current resident set) and `VmHWM` (peak resident set) from
//! `/proc/self/status`. `VmHWM` is process-wide, so [`MemorySample::reset_peak`]
//! restarts it at the current RSS before each request; the peak read after the
//! request then covers that request only. On platforms without procfs every
//! reading is `None` and the memory fields are left out of the result records.

use std::path::Path;

const PROC_STATUS: &str = "/proc/self/status";
const PROC_CLEAR_REFS: &str = "/proc/self/clear_refs";

/// `clear_refs` command that resets the peak resident set to the current one.
const RESET_PEAK_RSS: &[u8] = b"5";

/// One reading of the harness process memory, in MB.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemorySample {
    pub rss_mb: Option<f64>,
    pub peak_mb: Option<f64>,
}

impl MemorySample {
    /// Sample the current process.
    pub fn now() -> Self {
        Self::from_file(Path::new(PROC_STATUS))
    }

    /// Restart the process peak (`VmHWM`) from the current resident set.
    ///
    /// Returns `false` when the platform does not support it, in which case
    /// later peaks still include everything since process start.
    pub fn reset_peak() -> bool {
        reset_peak_at(Path::new(PROC_CLEAR_REFS))
    }

    fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(status) => Self::parse(&status),
            Err(_) => Self::default(),
        }
    }

    /// Parse the contents of a procfs status file.
    pub fn parse(status: &str) -> Self {
        let mut sample = Self::default();
        for line in status.lines() {
            if let Some(value) = line.strip_prefix("VmRSS:") {
                sample.rss_mb = parse_kb(value);
            } else if let Some(value) = line.strip_prefix("VmHWM:") {
                sample.peak_mb = parse_kb(value);
            }
        }
        sample
    }

    /// Resident memory change from `earlier` to `self`.
    pub fn delta_since(&self, earlier: &MemorySample) -> Option<f64> {
        Some(self.rss_mb? - earlier.rss_mb?)
    }
}

fn reset_peak_at(path: &Path) -> bool {
    match std::fs::write(path, RESET_PEAK_RSS) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Cannot reset peak RSS, peak covers the whole process");
            false
        }
    }
}

fn parse_kb(value: &str) -> Option<f64> {
    let kb: f64 = value.split_whitespace().next()?.parse().ok()?;
    Some(kb / 1024.0)
}
