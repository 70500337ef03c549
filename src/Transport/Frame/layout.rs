use super::Header::{FrameHeader, HEADER_SIZE, RESERVED_SIZE};

/// Byte-exact mirror of the renderer's packed `FrameHeader` struct.
///
/// Used where a header crosses the C ABI; in Rust code prefer [`FrameHeader`]
/// and the codec.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct WireHeader {
    pub magic: u32,
    pub frame_sequence: u64,
    pub timestamp_us: u64,
    pub sample_rate: u32,
    pub bin_count: u32,
    pub reserved: [u8; RESERVED_SIZE],
}

const _: () = assert!(std::mem::size_of::<WireHeader>() == HEADER_SIZE);

impl From<&FrameHeader> for WireHeader {
    fn from(header: &FrameHeader) -> Self {
        Self {
            magic: header.magic,
            frame_sequence: header.sequence,
            timestamp_us: header.timestamp_us,
            sample_rate: header.sample_rate,
            bin_count: header.bin_count,
            reserved: [0; RESERVED_SIZE],
        }
    }
}

/// Slot geometry of a segment: `slot_count` contiguous slots of `slot_size`
/// bytes each.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    slot_count: usize,
    slot_size: usize,
}

impl SlotLayout {
    pub const fn new(slot_count: usize, slot_size: usize) -> Self {
        Self {
            slot_count,
            slot_size,
        }
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        self.slot_count * self.slot_size
    }

    /// Byte offset of slot `index` within the segment.
    #[inline]
    pub fn slot_offset(&self, index: usize) -> usize {
        index * self.slot_size
    }

    /// Slot that frame `sequence` occupies.
    #[inline]
    pub fn slot_for_sequence(&self, sequence: u64) -> usize {
        (sequence % self.slot_count as u64) as usize
    }

    /// Bytes available for payload after the header.
    #[inline]
    pub fn payload_capacity(&self) -> usize {
        self.slot_size.saturating_sub(HEADER_SIZE)
    }
}
