use std::fmt;

use crate::inspect::Inspector;
use crate::Transport::{FrameReader, SharedMemoryTransport};

/// Debug function for SharedMemoryTransport
///
/// Shows the resource names, slot geometry and progress. The mapping itself
/// is opaque; dumping slot bytes belongs to the inspector.
pub fn debug_transport(transport: &SharedMemoryTransport, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedMemoryTransport")
        .field("segment", &transport.segment.name())
        .field("counter", &transport.counter.name())
        .field("backend", &transport.backend)
        .field("layout", &transport.layout)
        .field("frame_sequence", &transport.frame_sequence)
        .field("stats", &transport.stats)
        .finish_non_exhaustive()
}

/// Debug function for FrameReader
pub fn debug_reader(reader: &FrameReader, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FrameReader")
        .field("segment", &reader.segment.name())
        .field("counter", &reader.counter.name())
        .field("layout", &reader.layout)
        .field("next_sequence", &reader.next_sequence)
        .field("frames_read", &reader.frames_read)
        .field("frames_skipped", &reader.frames_skipped)
        .field("frames_invalid", &reader.frames_invalid)
        .finish_non_exhaustive()
}

/// Debug function for Inspector
pub fn debug_inspector(inspector: &Inspector, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Inspector")
        .field("segment", &inspector.segment.name())
        .field("counter", &inspector.counter.as_ref().map(|c| c.name().to_string()))
        .field("layout", &inspector.layout)
        .finish_non_exhaustive()
}
