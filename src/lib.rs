//! Shared-memory transport for spectral frames.
//!
//! A producer writes fixed-size frames (64-byte header + f32 magnitude/phase
//! bins) into a ring of slots in a named shared memory segment and posts a
//! named counting semaphore once per frame. An independent renderer reads the
//! slots in order and waits on the semaphore. When every slot is unread the
//! producer drops the frame instead of waiting.

// Module naming follows project convention (capitalised subsystem modules)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Transport;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod cleanup;
pub mod error;
pub mod ffi;
pub mod inspect;

pub use cleanup::{unlink_resources, unlink_resources_with, CleanupReport};
pub use error::{Result, VizError};
pub use Transport::{
    FrameReader, ReadOutcome, SharedMemoryTransport, TransportBuilder, TransportConfig,
    WriteOutcome,
};
