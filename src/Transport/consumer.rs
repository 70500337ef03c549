// src/Transport/consumer.rs

use std::time::Duration;

use super::Frame::codec::decode_bins;
use super::Frame::layout::SlotLayout;
use super::Frame::Header::{Frame, FrameHeader, BIN_SIZE, HEADER_SIZE};
use super::TransportConfig;
use crate::error::{Result, VizError};
use crate::Core::{AccessMode, FlowCounter, IpcBackend, SharedSegment};

/// What one read attempt produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    Frame(Frame),
    /// No unread slot within the timeout.
    Empty,
    /// A slot was signalled but did not hold a valid frame. It has been
    /// skipped; the next read moves on to the following slot.
    Invalid { slot: usize, reason: String },
}

/// Reference consumer: reads slots in sequence order and acknowledges each
/// one by decrementing the flow-control counter.
///
/// Attaches read-only; it never writes into the segment.
pub struct FrameReader {
    pub(crate) config: TransportConfig,
    pub(crate) layout: SlotLayout,
    pub(crate) segment: Box<dyn SharedSegment>,
    pub(crate) counter: Box<dyn FlowCounter>,
    include_phase: bool,
    pub(crate) next_sequence: u64,
    pub(crate) frames_read: u64,
    pub(crate) frames_skipped: u64,
    pub(crate) frames_invalid: u64,
    slot_buf: Vec<u8>,
}

impl FrameReader {
    /// Attach to the segment and counter named in `config`.
    ///
    /// `include_phase` must match what the producer writes: the header does
    /// not record whether phase bins follow the magnitudes.
    pub fn attach(
        config: TransportConfig,
        backend: &dyn IpcBackend,
        include_phase: bool,
    ) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();

        let segment = backend.attach_segment(&config.segment_name, AccessMode::ReadOnly)?;
        if segment.size() < layout.total_size() {
            return Err(VizError::invalid_config(
                "slot_count",
                format!(
                    "segment '{}' holds {} bytes but {} slots of {} need {}",
                    segment.name(),
                    segment.size(),
                    layout.slot_count(),
                    layout.slot_size(),
                    layout.total_size()
                ),
            ));
        }
        let counter = backend.attach_counter(&config.counter_name)?;

        Ok(Self {
            slot_buf: vec![0u8; layout.slot_size()],
            config,
            layout,
            segment,
            counter,
            include_phase,
            next_sequence: 0,
            frames_read: 0,
            frames_skipped: 0,
            frames_invalid: 0,
        })
    }

    /// Read the next frame if one is signalled, without waiting.
    pub fn try_read(&mut self) -> Result<ReadOutcome> {
        self.read_next(None)
    }

    /// Read the next frame, waiting up to `timeout` for the producer to
    /// signal one. `None` does not wait at all.
    pub fn read_next(&mut self, timeout: Option<Duration>) -> Result<ReadOutcome> {
        let acquired = match timeout {
            None => self.counter.try_wait()?,
            Some(timeout) => self.counter.wait_timeout(timeout)?,
        };
        if !acquired {
            return Ok(ReadOutcome::Empty);
        }

        let slot = self.layout.slot_for_sequence(self.next_sequence);
        let offset = self.layout.slot_offset(slot);
        self.segment.read_into(offset, &mut self.slot_buf)?;

        let header = match self.validate_slot() {
            Ok(header) => header,
            Err(e) => {
                self.frames_invalid += 1;
                self.next_sequence = self.next_sequence.wrapping_add(1);
                tracing::warn!(slot, error = %e, "skipping invalid slot");
                return Ok(ReadOutcome::Invalid {
                    slot,
                    reason: e.to_string(),
                });
            }
        };

        if header.sequence > self.next_sequence {
            let gap = header.sequence - self.next_sequence;
            self.frames_skipped += gap;
            tracing::debug!(gap, sequence = header.sequence, "sequence gap");
        }
        self.next_sequence = header.sequence + 1;
        self.frames_read += 1;

        let bins = header.bin_count as usize;
        let payload = &self.slot_buf[HEADER_SIZE..];
        let magnitude = decode_bins(payload, bins);
        let phase = self
            .include_phase
            .then(|| decode_bins(&payload[bins * BIN_SIZE..], bins));

        Ok(ReadOutcome::Frame(Frame {
            header,
            magnitude,
            phase,
        }))
    }

    fn validate_slot(&self) -> Result<FrameHeader> {
        let header = FrameHeader::decode(&self.slot_buf, self.config.magic)?;
        if header.sequence == u64::MAX {
            return Err(VizError::invalid_header("sequence number out of range"));
        }
        if header.bin_count as usize > self.config.max_bins {
            return Err(VizError::invalid_header(format!(
                "bin count {} exceeds limit {}",
                header.bin_count, self.config.max_bins
            )));
        }
        let required = HEADER_SIZE + header.payload_len(self.include_phase);
        if required > self.layout.slot_size() {
            return Err(VizError::invalid_header(format!(
                "payload of {required} bytes overruns slot of {}",
                self.layout.slot_size()
            )));
        }
        Ok(header)
    }

    /// Sequence number expected in the next slot.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Sequences that never reached this reader.
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn frames_invalid(&self) -> u64 {
        self.frames_invalid
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}
