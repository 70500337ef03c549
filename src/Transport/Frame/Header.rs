// Frame header: the fixed 64-byte record at the start of every slot.
// Shared with the native renderer, so every value here is part of the wire contract.

/// Protocol magic, "VIZF". A slot whose first four bytes differ is not a frame.
pub const MAGIC_NUMBER: u32 = 0x5649_5A46;

/// Size of the encoded header in bytes. The payload starts right after it.
pub const HEADER_SIZE: usize = 64;

/// Default number of slots in the segment.
pub const DEFAULT_SLOT_COUNT: usize = 8;

/// Default slot size in bytes (header + payload + zero padding).
pub const DEFAULT_SLOT_SIZE: usize = 8192;

/// Default upper bound on bins per frame. Longer vectors are truncated.
pub const DEFAULT_MAX_BINS: usize = 512;

/// Default segment name, as opened by the renderer.
pub const DEFAULT_SEGMENT_NAME: &str = "/audioviz_shm";

/// Default flow-control counter name.
pub const DEFAULT_COUNTER_NAME: &str = "/audioviz_sem_write";

pub const MAGIC_OFFSET: usize = 0;
pub const SEQUENCE_OFFSET: usize = 4;
pub const TIMESTAMP_OFFSET: usize = 12;
pub const SAMPLE_RATE_OFFSET: usize = 20;
pub const BIN_COUNT_OFFSET: usize = 24;
pub const RESERVED_OFFSET: usize = 28;
pub const RESERVED_SIZE: usize = HEADER_SIZE - RESERVED_OFFSET;

/// Bytes per encoded bin (little-endian f32).
pub const BIN_SIZE: usize = std::mem::size_of::<f32>();

/// Decoded frame header.
///
/// Plain Rust values; [`encode`](FrameHeader::encode) and
/// [`decode`](FrameHeader::decode) do the byte-level work.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    /// Monotonic per-producer sequence, starting at 0.
    pub sequence: u64,
    /// Producer wall-clock time in microseconds since the Unix epoch.
    pub timestamp_us: u64,
    pub sample_rate: u32,
    /// Number of magnitude bins in the payload (and phase bins, if present).
    pub bin_count: u32,
}

/// One frame as read back from a slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub magnitude: Vec<f32>,
    pub phase: Option<Vec<f32>>,
}
