//! Read-only view of a live segment, for debugging producer/renderer pairs.

use std::fmt;

use crate::error::{Result, VizError};
use crate::Transport::Frame::codec::{decode_bins, is_blank};
use crate::Transport::Frame::Header::{FrameHeader, BIN_SIZE, HEADER_SIZE, MAGIC_OFFSET};
use crate::Transport::Frame::SlotLayout;
use crate::Transport::TransportConfig;
use crate::Core::{AccessMode, FlowCounter, IpcBackend, SharedSegment};

/// Number of leading magnitude bins shown per valid slot.
pub const PREVIEW_BINS: usize = 5;

/// State of one slot as seen by the inspector.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotReport {
    /// Header bytes are all zero: never written.
    Empty,
    /// Something is there, but it is not a frame.
    InvalidMagic { found: u32 },
    Valid {
        header: FrameHeader,
        leading_bins: Vec<f32>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub segment_name: String,
    pub segment_size: usize,
    /// `None` when the counter could not be attached.
    pub counter_value: Option<u32>,
    pub slots: Vec<SlotReport>,
}

impl Snapshot {
    pub fn valid_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotReport::Valid { .. }))
            .count()
    }
}

/// Read-only attachment that never touches the counter's value.
pub struct Inspector {
    pub(crate) config: TransportConfig,
    pub(crate) layout: SlotLayout,
    pub(crate) segment: Box<dyn SharedSegment>,
    pub(crate) counter: Option<Box<dyn FlowCounter>>,
}

impl Inspector {
    /// Attach to the segment. A missing counter is tolerated and reported as
    /// an unknown value.
    pub fn attach(config: TransportConfig, backend: &dyn IpcBackend) -> Result<Self> {
        config.validate()?;
        let segment = backend.attach_segment(&config.segment_name, AccessMode::ReadOnly)?;
        let counter = match backend.attach_counter(&config.counter_name) {
            Ok(counter) => Some(counter),
            Err(VizError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        // Inspect whatever fits, even if the segment is smaller than configured.
        let slot_count = (segment.size() / config.slot_size).min(config.slot_count);
        let layout = SlotLayout::new(slot_count, config.slot_size);

        Ok(Self {
            config,
            layout,
            segment,
            counter,
        })
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let counter_value = match &self.counter {
            Some(counter) => Some(counter.value()?),
            None => None,
        };

        let mut slots = Vec::with_capacity(self.layout.slot_count());
        let mut header = [0u8; HEADER_SIZE];
        for index in 0..self.layout.slot_count() {
            let offset = self.layout.slot_offset(index);
            self.segment.read_into(offset, &mut header)?;
            slots.push(self.classify(offset, &header)?);
        }

        Ok(Snapshot {
            segment_name: self.segment.name().to_string(),
            segment_size: self.segment.size(),
            counter_value,
            slots,
        })
    }

    fn classify(&self, offset: usize, bytes: &[u8; HEADER_SIZE]) -> Result<SlotReport> {
        if is_blank(bytes) {
            return Ok(SlotReport::Empty);
        }
        let header = match FrameHeader::decode(bytes, self.config.magic) {
            Ok(header) => header,
            Err(_) => {
                let mut magic = [0u8; 4];
                magic.copy_from_slice(&bytes[MAGIC_OFFSET..MAGIC_OFFSET + 4]);
                return Ok(SlotReport::InvalidMagic {
                    found: u32::from_le_bytes(magic),
                });
            }
        };

        let capacity = self.layout.payload_capacity() / BIN_SIZE;
        let count = (header.bin_count as usize).min(PREVIEW_BINS).min(capacity);
        let raw = self
            .segment
            .read_at(offset + HEADER_SIZE, count * BIN_SIZE)?;
        Ok(SlotReport::Valid {
            header,
            leading_bins: decode_bins(&raw, count),
        })
    }
}

/// Attach, take one snapshot, detach.
pub fn inspect_segment(backend: &dyn IpcBackend, config: TransportConfig) -> Result<Snapshot> {
    Inspector::attach(config, backend)?.snapshot()
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Segment {} ({} bytes, {} slots)",
            self.segment_name,
            self.segment_size,
            self.slots.len()
        )?;
        match self.counter_value {
            Some(v) => writeln!(f, "Unread slots: {v}")?,
            None => writeln!(f, "Unread slots: unknown (counter missing)")?,
        }
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                SlotReport::Empty => writeln!(f, "Slot {index}: [EMPTY]")?,
                SlotReport::InvalidMagic { found } => {
                    writeln!(f, "Slot {index}: [INVALID MAGIC: 0x{found:08X}]")?
                }
                SlotReport::Valid {
                    header,
                    leading_bins,
                } => {
                    writeln!(f, "Slot {index}:")?;
                    writeln!(f, "  Frame: {}", header.sequence)?;
                    writeln!(f, "  Timestamp: {} us", header.timestamp_us)?;
                    writeln!(f, "  Sample rate: {} Hz", header.sample_rate)?;
                    writeln!(f, "  Bin count: {}", header.bin_count)?;
                    let bins: Vec<String> = leading_bins.iter().map(|m| format!("{m:.3}")).collect();
                    writeln!(f, "  First bins: [{}]", bins.join(", "))?;
                }
            }
        }
        Ok(())
    }
}
