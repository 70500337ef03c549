use std::time::Duration;

use super::Frame::layout::SlotLayout;
use super::Frame::Header::{
    DEFAULT_COUNTER_NAME, DEFAULT_MAX_BINS, DEFAULT_SEGMENT_NAME, DEFAULT_SLOT_COUNT,
    DEFAULT_SLOT_SIZE, HEADER_SIZE, MAGIC_NUMBER,
};
use crate::error::{Result, VizError};

/// Largest slot count a POSIX semaphore can represent (`SEM_VALUE_MAX`).
pub const MAX_SLOT_COUNT: usize = i32::MAX as usize;

/// Default period between dropped/truncated frame summaries.
pub const DEFAULT_SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

/// Immutable description of a segment, its counter and the frame limits.
///
/// Producer, reader and inspector must agree on every field except
/// `summary_interval`. Build one with
/// [`TransportBuilder`](super::TransportBuilder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub(crate) segment_name: String,
    pub(crate) counter_name: String,
    pub(crate) slot_count: usize,
    pub(crate) slot_size: usize,
    pub(crate) max_bins: usize,
    pub(crate) magic: u32,
    pub(crate) summary_interval: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            segment_name: DEFAULT_SEGMENT_NAME.to_string(),
            counter_name: DEFAULT_COUNTER_NAME.to_string(),
            slot_count: DEFAULT_SLOT_COUNT,
            slot_size: DEFAULT_SLOT_SIZE,
            max_bins: DEFAULT_MAX_BINS,
            magic: MAGIC_NUMBER,
            summary_interval: Some(DEFAULT_SUMMARY_INTERVAL),
        }
    }
}

impl TransportConfig {
    pub fn segment_name(&self) -> &str {
        &self.segment_name
    }

    pub fn counter_name(&self) -> &str {
        &self.counter_name
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn max_bins(&self) -> usize {
        self.max_bins
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn summary_interval(&self) -> Option<Duration> {
        self.summary_interval
    }

    pub fn layout(&self) -> SlotLayout {
        SlotLayout::new(self.slot_count, self.slot_size)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(VizError::invalid_config("slot_count", "must be at least 1"));
        }
        if self.slot_count > MAX_SLOT_COUNT {
            return Err(VizError::invalid_config(
                "slot_count",
                format!("must not exceed {MAX_SLOT_COUNT}"),
            ));
        }
        if self.slot_size < HEADER_SIZE {
            return Err(VizError::invalid_config(
                "slot_size",
                format!("{} is smaller than the {HEADER_SIZE}-byte header", self.slot_size),
            ));
        }
        if self.slot_count.checked_mul(self.slot_size).is_none() {
            return Err(VizError::invalid_config(
                "slot_size",
                "slot_count * slot_size overflows",
            ));
        }
        if self.max_bins == 0 || self.max_bins > u32::MAX as usize {
            return Err(VizError::invalid_config(
                "max_bins",
                "must be between 1 and u32::MAX",
            ));
        }
        crate::Core::backend::normalize_name(&self.segment_name)?;
        crate::Core::backend::normalize_name(&self.counter_name)?;
        Ok(())
    }
}
