use std::time::{Duration, Instant};

/// Running totals kept by the producer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that reached a slot and were signalled.
    pub written: u64,
    /// Frames dropped by the backpressure gate.
    pub dropped: u64,
    /// Written frames whose bins were cut down to `max_bins`.
    pub truncated: u64,
    /// Frames refused for being too large or malformed.
    pub rejected: u64,
}

impl FrameStats {
    fn since(&self, earlier: &FrameStats) -> FrameStats {
        FrameStats {
            written: self.written - earlier.written,
            dropped: self.dropped - earlier.dropped,
            truncated: self.truncated - earlier.truncated,
            rejected: self.rejected - earlier.rejected,
        }
    }
}

/// Emits one log line per interval instead of one per lossy frame.
#[derive(Debug)]
pub(crate) struct SummaryLog {
    interval: Option<Duration>,
    last_emit: Instant,
    baseline: FrameStats,
}

impl SummaryLog {
    pub(crate) fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            last_emit: Instant::now(),
            baseline: FrameStats::default(),
        }
    }

    pub(crate) fn maybe_emit(&mut self, totals: &FrameStats) {
        let Some(interval) = self.interval else {
            return;
        };
        if self.last_emit.elapsed() < interval {
            return;
        }
        self.emit(totals);
    }

    pub(crate) fn emit(&mut self, totals: &FrameStats) {
        let window = totals.since(&self.baseline);
        if window.dropped > 0 || window.truncated > 0 || window.rejected > 0 {
            tracing::warn!(
                written = window.written,
                dropped = window.dropped,
                truncated = window.truncated,
                rejected = window.rejected,
                total_written = totals.written,
                total_dropped = totals.dropped,
                "lossy frames since last summary"
            );
        } else {
            tracing::debug!(
                written = window.written,
                total_written = totals.written,
                "frame summary"
            );
        }
        self.baseline = *totals;
        self.last_emit = Instant::now();
    }
}
