//! Removal of the named segment and counter, independent of any running
//! producer.
//!
//! A producer that exits without calling
//! [`SharedMemoryTransport::cleanup`](crate::Transport::SharedMemoryTransport::cleanup)
//! leaves both objects behind (they live in `/dev/shm` on Linux). Running
//! [`unlink_resources`] from any process removes them.

use crate::error::Result;
use crate::Core::{IpcBackend, PosixBackend};

/// Which resources a cleanup call actually removed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub segment_removed: bool,
    pub counter_removed: bool,
}

impl CleanupReport {
    pub fn removed_anything(&self) -> bool {
        self.segment_removed || self.counter_removed
    }
}

/// Unlink the POSIX segment and counter. Absent resources are not an error.
pub fn unlink_resources(segment_name: &str, counter_name: &str) -> Result<CleanupReport> {
    unlink_resources_with(&PosixBackend, segment_name, counter_name)
}

/// Unlink both resources through `backend`.
///
/// Both removals are attempted even if the first fails; the first error is
/// returned after the second attempt.
pub fn unlink_resources_with(
    backend: &dyn IpcBackend,
    segment_name: &str,
    counter_name: &str,
) -> Result<CleanupReport> {
    let segment = backend.unlink_segment(segment_name);
    let counter = backend.unlink_counter(counter_name);

    let report = CleanupReport {
        segment_removed: *segment.as_ref().unwrap_or(&false),
        counter_removed: *counter.as_ref().unwrap_or(&false),
    };
    segment?;
    counter?;

    if report.segment_removed {
        tracing::info!(segment = segment_name, "unlinked shared memory segment");
    }
    if report.counter_removed {
        tracing::info!(counter = counter_name, "unlinked flow-control counter");
    }
    if !report.removed_anything() {
        tracing::debug!(segment = segment_name, counter = counter_name, "nothing to clean up");
    }
    Ok(report)
}
