//! Error types for the shared-memory frame transport.

use std::io;

/// Result alias that carries [`VizError`].
pub type Result<T> = std::result::Result<T, VizError>;

/// Everything that can go wrong while creating, writing, reading or removing
/// the shared segment and its flow-control counter.
///
/// Backpressure is not an error: a saturated counter is reported through
/// [`WriteOutcome::Dropped`](crate::Transport::WriteOutcome::Dropped).
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    /// A segment or counter could not be created or attached. The producer
    /// cannot start.
    #[error("failed to {action} {kind} '{name}': {source}")]
    ResourceCreation {
        kind: ResourceKind,
        action: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    /// Attach was requested for a resource that does not exist.
    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: ResourceKind, name: String },

    /// Header plus payload does not fit in one slot. The frame was dropped and
    /// the sequence left unchanged.
    #[error("frame of {required} bytes exceeds slot size {slot_size}")]
    FrameTooLarge { required: usize, slot_size: usize },

    /// Phase vector length differs from the magnitude vector length.
    #[error("phase has {phase} bins but magnitude has {magnitude}")]
    PhaseLengthMismatch { magnitude: usize, phase: usize },

    /// Slot contents are not a valid frame (bad magic, short buffer, bin count
    /// out of range).
    #[error("invalid frame header: {reason}")]
    InvalidHeader { reason: String },

    /// Raw segment access outside of the mapped range.
    #[error("access of {len} bytes at offset {offset} exceeds segment size {size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// Write through a read-only attachment.
    #[error("segment '{name}' is attached read-only")]
    ReadOnly { name: String },

    /// Rejected slot geometry or limits.
    #[error("invalid configuration: {parameter} - {message}")]
    InvalidConfig {
        parameter: &'static str,
        message: String,
    },

    /// Resource name that the OS cannot accept.
    #[error("invalid resource name '{name}': {message}")]
    InvalidName { name: String, message: String },

    /// Backend not available on this platform.
    #[error("{0}")]
    Unsupported(&'static str),

    /// Any other OS-level failure during an operation on an open resource.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Which of the two named OS objects an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Segment,
    Counter,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Segment => f.write_str("shared memory segment"),
            ResourceKind::Counter => f.write_str("flow-control counter"),
        }
    }
}

impl VizError {
    pub(crate) fn create(kind: ResourceKind, name: &str, source: io::Error) -> Self {
        Self::ResourceCreation {
            kind,
            action: "create",
            name: name.to_string(),
            source,
        }
    }

    /// Attach failures map `ENOENT` to [`VizError::NotFound`].
    pub(crate) fn attach(kind: ResourceKind, name: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound {
                kind,
                name: name.to_string(),
            };
        }
        Self::ResourceCreation {
            kind,
            action: "attach",
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn invalid_header(reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            parameter,
            message: message.into(),
        }
    }

    /// True for failures that should stop a producer or reader from starting
    /// or continuing. Per-frame rejections return false.
    pub fn is_fatal(&self) -> bool {
        match self {
            VizError::FrameTooLarge { .. }
            | VizError::PhaseLengthMismatch { .. }
            | VizError::InvalidHeader { .. } => false,
            _ => true,
        }
    }
}
