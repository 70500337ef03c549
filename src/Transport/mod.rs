mod builder;
mod config;
mod consumer;
mod debug;
mod producer;
mod stats;

pub use builder::TransportBuilder;
pub use config::{TransportConfig, DEFAULT_SUMMARY_INTERVAL, MAX_SLOT_COUNT};
pub use consumer::{FrameReader, ReadOutcome};
pub use producer::{SharedMemoryTransport, WriteOutcome};
pub use stats::FrameStats;

pub mod Frame;
