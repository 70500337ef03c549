use super::Header::*;
use crate::error::{Result, VizError};

impl FrameHeader {
    /// Encode into exactly [`HEADER_SIZE`] little-endian bytes. Reserved bytes
    /// are zero.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[MAGIC_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&self.magic.to_le_bytes());
        out[SEQUENCE_OFFSET..TIMESTAMP_OFFSET].copy_from_slice(&self.sequence.to_le_bytes());
        out[TIMESTAMP_OFFSET..SAMPLE_RATE_OFFSET].copy_from_slice(&self.timestamp_us.to_le_bytes());
        out[SAMPLE_RATE_OFFSET..BIN_COUNT_OFFSET].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[BIN_COUNT_OFFSET..RESERVED_OFFSET].copy_from_slice(&self.bin_count.to_le_bytes());
        out
    }

    /// Decode the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Fails with [`VizError::InvalidHeader`] when the buffer is short or the
    /// magic is not `expected_magic`. Reserved bytes are ignored.
    pub fn decode(bytes: &[u8], expected_magic: u32) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(VizError::invalid_header(format!(
                "need {HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let magic = read_u32(bytes, MAGIC_OFFSET);
        if magic != expected_magic {
            return Err(VizError::invalid_header(format!(
                "magic 0x{magic:08X} (expected 0x{expected_magic:08X})"
            )));
        }
        Ok(Self {
            magic,
            sequence: read_u64(bytes, SEQUENCE_OFFSET),
            timestamp_us: read_u64(bytes, TIMESTAMP_OFFSET),
            sample_rate: read_u32(bytes, SAMPLE_RATE_OFFSET),
            bin_count: read_u32(bytes, BIN_COUNT_OFFSET),
        })
    }

    /// Encoded payload length for this header.
    pub fn payload_len(&self, with_phase: bool) -> usize {
        let planes = if with_phase { 2 } else { 1 };
        self.bin_count as usize * BIN_SIZE * planes
    }
}

/// True when the header region has never been written (all zero).
pub fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().take(HEADER_SIZE).all(|&b| b == 0)
}

/// Append `values` as little-endian f32.
pub fn encode_bins(out: &mut Vec<u8>, values: &[f32]) {
    out.reserve(values.len() * BIN_SIZE);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Read `count` little-endian f32 values. `bytes` must hold at least
/// `count * BIN_SIZE` bytes.
pub fn decode_bins(bytes: &[u8], count: usize) -> Vec<f32> {
    bytes
        .chunks_exact(BIN_SIZE)
        .take(count)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
