use std::sync::Arc;
use std::time::Duration;

use super::{FrameReader, SharedMemoryTransport, TransportConfig};
use crate::error::Result;
use crate::inspect::Inspector;
use crate::Core::{IpcBackend, PosixBackend};

pub struct TransportBuilder {
    config: TransportConfig,
    backend: Arc<dyn IpcBackend>,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self {
            config: TransportConfig::default(),
            backend: Arc::new(PosixBackend),
        }
    }
}

impl TransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment_name(mut self, name: impl Into<String>) -> Self {
        self.config.segment_name = name.into();
        self
    }

    pub fn with_counter_name(mut self, name: impl Into<String>) -> Self {
        self.config.counter_name = name.into();
        self
    }

    pub fn with_slot_count(mut self, slot_count: usize) -> Self {
        self.config.slot_count = slot_count;
        self
    }

    pub fn with_slot_size(mut self, slot_size: usize) -> Self {
        self.config.slot_size = slot_size;
        self
    }

    pub fn with_max_bins(mut self, max_bins: usize) -> Self {
        self.config.max_bins = max_bins;
        self
    }

    pub fn with_magic(mut self, magic: u32) -> Self {
        self.config.magic = magic;
        self
    }

    /// `None` disables the periodic dropped/truncated summary.
    pub fn with_summary_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.summary_interval = interval;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn IpcBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn build_config(self) -> Result<TransportConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Create the segment and counter and return the producer side.
    pub fn build_producer(self) -> Result<SharedMemoryTransport> {
        SharedMemoryTransport::create(self.config, self.backend)
    }

    /// Attach to an existing segment and counter as the consuming side.
    pub fn build_reader(self, include_phase: bool) -> Result<FrameReader> {
        FrameReader::attach(self.config, self.backend.as_ref(), include_phase)
    }

    /// Attach read-only for inspection.
    pub fn build_inspector(self) -> Result<Inspector> {
        Inspector::attach(self.config, self.backend.as_ref())
    }
}
