// In src/Transport/producer.rs
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::stats::{FrameStats, SummaryLog};
use super::Frame::codec::encode_bins;
use super::Frame::layout::SlotLayout;
use super::Frame::Header::{FrameHeader, HEADER_SIZE};
use super::TransportConfig;
use crate::cleanup::{unlink_resources_with, CleanupReport};
use crate::error::{Result, VizError};
use crate::Core::{FlowCounter, IpcBackend, SharedSegment};

/// Result of a write that did not fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Frame `sequence` was written into `slot` and signalled.
    Written { sequence: u64, slot: usize },
    /// The counter showed every slot unread; nothing was written.
    Dropped,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// The producer side of the transport.
///
/// Owns the segment and counter it created. It never waits on the consumer:
/// when all slots are unread, [`write_frame`](Self::write_frame) returns
/// [`WriteOutcome::Dropped`] immediately. Exactly one producer per segment is
/// supported; `&mut self` on the write path keeps it that way in-process.
pub struct SharedMemoryTransport {
    pub(crate) config: TransportConfig,
    pub(crate) layout: SlotLayout,
    pub(crate) backend: Arc<dyn IpcBackend>,
    pub(crate) segment: Box<dyn SharedSegment>,
    pub(crate) counter: Box<dyn FlowCounter>,
    pub(crate) frame_sequence: u64,
    slot_buf: Vec<u8>,
    pub(crate) stats: FrameStats,
    summary: SummaryLog,
}

impl SharedMemoryTransport {
    /// Create the segment and counter named in `config`, replacing stale
    /// ones. Fails if either cannot be created; nothing is left behind in
    /// that case.
    pub fn create(config: TransportConfig, backend: Arc<dyn IpcBackend>) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();

        let segment = backend.create_segment(&config.segment_name, layout.total_size())?;
        let counter = match backend.create_counter(&config.counter_name) {
            Ok(counter) => counter,
            Err(e) => {
                tracing::error!(counter = %config.counter_name, error = %e, "failed to create counter");
                drop(segment);
                if let Err(unlink_err) = backend.unlink_segment(&config.segment_name) {
                    tracing::warn!(
                        segment = %config.segment_name,
                        error = %unlink_err,
                        "could not remove segment after counter failure"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            segment = %segment.name(),
            counter = %counter.name(),
            slots = layout.slot_count(),
            slot_size = layout.slot_size(),
            "transport ready"
        );

        Ok(Self {
            summary: SummaryLog::new(config.summary_interval),
            slot_buf: Vec::with_capacity(layout.slot_size()),
            config,
            layout,
            backend,
            segment,
            counter,
            frame_sequence: 0,
            stats: FrameStats::default(),
        })
    }

    /// Write one spectral frame.
    ///
    /// # Returns
    /// * `Ok(Written)` - frame stored and the consumer signalled
    /// * `Ok(Dropped)` - every slot is unread; try again with the next frame
    /// * `Err(FrameTooLarge | PhaseLengthMismatch)` - this frame was refused,
    ///   the transport is still usable
    /// * `Err(Io)` - the segment or counter failed
    ///
    /// Magnitude (and phase) beyond `max_bins` is discarded before writing.
    pub fn write_frame(
        &mut self,
        magnitude: &[f32],
        sample_rate: u32,
        phase: Option<&[f32]>,
    ) -> Result<WriteOutcome> {
        // Backpressure gate: never wait on the consumer.
        if self.counter.value()? as usize >= self.layout.slot_count() {
            self.stats.dropped += 1;
            tracing::trace!(sequence = self.frame_sequence, "buffer full, dropping frame");
            self.summary.maybe_emit(&self.stats);
            return Ok(WriteOutcome::Dropped);
        }

        if let Some(phase) = phase {
            if phase.len() != magnitude.len() {
                self.stats.rejected += 1;
                return Err(VizError::PhaseLengthMismatch {
                    magnitude: magnitude.len(),
                    phase: phase.len(),
                });
            }
        }

        let max_bins = self.config.max_bins;
        let truncated = magnitude.len() > max_bins;
        let (magnitude, phase) = if truncated {
            (&magnitude[..max_bins], phase.map(|p| &p[..max_bins]))
        } else {
            (magnitude, phase)
        };

        let sequence = self.frame_sequence;
        let slot = self.layout.slot_for_sequence(sequence);
        let offset = self.layout.slot_offset(slot);

        let header = FrameHeader {
            magic: self.config.magic,
            sequence,
            timestamp_us: now_micros(),
            sample_rate,
            bin_count: magnitude.len() as u32,
        };

        let required = HEADER_SIZE + header.payload_len(phase.is_some());
        let slot_size = self.layout.slot_size();
        if required > slot_size {
            self.stats.rejected += 1;
            tracing::error!(required, slot_size, "frame exceeds slot size");
            return Err(VizError::FrameTooLarge {
                required,
                slot_size,
            });
        }

        self.slot_buf.clear();
        self.slot_buf.extend_from_slice(&header.encode());
        encode_bins(&mut self.slot_buf, magnitude);
        if let Some(phase) = phase {
            encode_bins(&mut self.slot_buf, phase);
        }
        self.slot_buf.resize(slot_size, 0);

        self.segment.write_at(offset, &self.slot_buf)?;
        self.counter.signal()?;

        self.frame_sequence += 1;
        self.stats.written += 1;
        if truncated {
            self.stats.truncated += 1;
        }

        if self.frame_sequence % 100 == 0 {
            tracing::debug!(sequence = self.frame_sequence, slot, "wrote frame");
        }
        self.summary.maybe_emit(&self.stats);

        Ok(WriteOutcome::Written { sequence, slot })
    }

    /// Sequence number the next successful write will carry.
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    /// Byte offset of slot `index` in the segment.
    pub fn slot_offset(&self, index: usize) -> usize {
        self.layout.slot_offset(index)
    }

    /// Current flow-control count (written but not yet consumed).
    pub fn pending(&self) -> Result<u32> {
        self.counter.value()
    }

    /// Release this process's handles. The named segment and counter stay in
    /// place for other processes; use [`cleanup`](Self::cleanup) to remove them.
    pub fn close(mut self) {
        self.summary.emit(&self.stats);
        tracing::info!(segment = %self.config.segment_name, "transport closed");
    }

    /// Release handles and unlink the segment and counter.
    pub fn cleanup(mut self) -> Result<CleanupReport> {
        self.summary.emit(&self.stats);
        let Self {
            config,
            backend,
            segment,
            counter,
            ..
        } = self;
        drop(segment);
        drop(counter);
        unlink_resources_with(backend.as_ref(), &config.segment_name, &config.counter_name)
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
