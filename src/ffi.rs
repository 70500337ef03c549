use std::ffi::{c_char, CStr};
use std::ptr;
use std::time::Duration;

use crate::cleanup::unlink_resources;
use crate::error::VizError;
use crate::Transport::Frame::WireHeader;
use crate::Transport::{
    FrameReader, ReadOutcome, SharedMemoryTransport, TransportBuilder, WriteOutcome,
};

// Status codes
pub const VIZSHM_WRITTEN: i32 = 1;
pub const VIZSHM_DROPPED: i32 = 0;
pub const VIZSHM_SUCCESS: i32 = 0;
pub const VIZSHM_EMPTY: i32 = 0;
pub const VIZSHM_ERROR_NULL_POINTER: i32 = -1;
pub const VIZSHM_ERROR_INVALID_ARG: i32 = -2;
pub const VIZSHM_ERROR_FRAME_TOO_LARGE: i32 = -3;
pub const VIZSHM_ERROR_INVALID_FRAME: i32 = -4;
pub const VIZSHM_ERROR_INTERNAL: i32 = -6;

/// Handle to a producer instance (opaque pointer)
pub struct ProducerHandle {
    inner: SharedMemoryTransport,
}

/// Handle to a reader instance (opaque pointer)
pub struct ReaderHandle {
    inner: FrameReader,
}

/// Borrow a C string, treating NULL as "use the default".
unsafe fn opt_str<'a>(s: *const c_char) -> Result<Option<&'a str>, ()> {
    if s.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(s).to_str().map(Some).map_err(|_| ())
}

fn builder(
    segment: Option<&str>,
    counter: Option<&str>,
    slot_count: u32,
    slot_size: u32,
    max_bins: u32,
) -> TransportBuilder {
    let mut builder = TransportBuilder::new();
    if let Some(name) = segment {
        builder = builder.with_segment_name(name);
    }
    if let Some(name) = counter {
        builder = builder.with_counter_name(name);
    }
    if slot_count > 0 {
        builder = builder.with_slot_count(slot_count as usize);
    }
    if slot_size > 0 {
        builder = builder.with_slot_size(slot_size as usize);
    }
    if max_bins > 0 {
        builder = builder.with_max_bins(max_bins as usize);
    }
    builder
}

fn error_code(e: &VizError) -> i32 {
    match e {
        VizError::FrameTooLarge { .. } => VIZSHM_ERROR_FRAME_TOO_LARGE,
        VizError::PhaseLengthMismatch { .. } | VizError::InvalidConfig { .. } => {
            VIZSHM_ERROR_INVALID_ARG
        }
        VizError::InvalidHeader { .. } => VIZSHM_ERROR_INVALID_FRAME,
        _ => VIZSHM_ERROR_INTERNAL,
    }
}

// -----------------------------------------------------------------------------
// Producer API
// -----------------------------------------------------------------------------

/// Create a producer, creating the segment and counter.
///
/// # Arguments
/// * `segment` / `counter` - Resource names, or NULL for the defaults.
/// * `slot_count`, `slot_size`, `max_bins` - Geometry, or 0 for the defaults.
///
/// # Returns
/// * Pointer to `ProducerHandle`, or NULL on failure.
///
/// # Safety
/// Non-NULL names must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn vizshm_producer_new(
    segment: *const c_char,
    counter: *const c_char,
    slot_count: u32,
    slot_size: u32,
    max_bins: u32,
) -> *mut ProducerHandle {
    let (Ok(segment), Ok(counter)) = (opt_str(segment), opt_str(counter)) else {
        tracing::error!("vizshm_producer_new: resource name is not UTF-8");
        return ptr::null_mut();
    };

    match builder(segment, counter, slot_count, slot_size, max_bins).build_producer() {
        Ok(producer) => Box::into_raw(Box::new(ProducerHandle { inner: producer })),
        Err(e) => {
            tracing::error!(error = %e, "vizshm_producer_new failed");
            ptr::null_mut()
        }
    }
}

/// Write one frame.
///
/// # Arguments
/// * `magnitude` - `len` magnitude bins.
/// * `phase` - `len` phase bins, or NULL.
///
/// # Returns
/// * 1 if written, 0 if dropped for backpressure, negative error code otherwise.
///
/// # Safety
/// `magnitude` (and `phase` when non-NULL) must point to `len` floats.
#[no_mangle]
pub unsafe extern "C" fn vizshm_producer_write(
    handle: *mut ProducerHandle,
    magnitude: *const f32,
    phase: *const f32,
    len: usize,
    sample_rate: u32,
) -> i32 {
    if handle.is_null() || magnitude.is_null() {
        return VIZSHM_ERROR_NULL_POINTER;
    }

    let producer = &mut (*handle).inner;
    let magnitude = std::slice::from_raw_parts(magnitude, len);
    let phase = (!phase.is_null()).then(|| std::slice::from_raw_parts(phase, len));

    match producer.write_frame(magnitude, sample_rate, phase) {
        Ok(WriteOutcome::Written { .. }) => VIZSHM_WRITTEN,
        Ok(WriteOutcome::Dropped) => VIZSHM_DROPPED,
        Err(e) => error_code(&e),
    }
}

/// Sequence number the next successful write will carry.
///
/// # Safety
/// `handle` must come from `vizshm_producer_new`.
#[no_mangle]
pub unsafe extern "C" fn vizshm_producer_sequence(handle: *const ProducerHandle) -> u64 {
    if handle.is_null() {
        return 0;
    }
    (*handle).inner.frame_sequence()
}

/// Free a producer handle. With `unlink` set the segment and counter are
/// removed too.
///
/// # Safety
/// `handle` must come from `vizshm_producer_new` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn vizshm_producer_free(handle: *mut ProducerHandle, unlink: bool) -> i32 {
    if handle.is_null() {
        return VIZSHM_SUCCESS;
    }
    let ProducerHandle { inner } = *Box::from_raw(handle);
    if !unlink {
        inner.close();
        return VIZSHM_SUCCESS;
    }
    match inner.cleanup() {
        Ok(_) => VIZSHM_SUCCESS,
        Err(e) => error_code(&e),
    }
}

// -----------------------------------------------------------------------------
// Reader API
// -----------------------------------------------------------------------------

/// Attach a reader to an existing segment and counter.
///
/// # Safety
/// Non-NULL names must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn vizshm_reader_new(
    segment: *const c_char,
    counter: *const c_char,
    slot_count: u32,
    slot_size: u32,
    max_bins: u32,
    include_phase: bool,
) -> *mut ReaderHandle {
    let (Ok(segment), Ok(counter)) = (opt_str(segment), opt_str(counter)) else {
        tracing::error!("vizshm_reader_new: resource name is not UTF-8");
        return ptr::null_mut();
    };

    match builder(segment, counter, slot_count, slot_size, max_bins).build_reader(include_phase) {
        Ok(reader) => Box::into_raw(Box::new(ReaderHandle { inner: reader })),
        Err(e) => {
            tracing::error!(error = %e, "vizshm_reader_new failed");
            ptr::null_mut()
        }
    }
}

/// Read the next frame.
///
/// # Arguments
/// * `timeout_ms` - 0 returns immediately when nothing is signalled.
/// * `out_header` - Receives the 64-byte header (may be NULL).
/// * `out_magnitude` - Receives up to `capacity` magnitude bins.
///
/// # Returns
/// * Number of bins copied, 0 if no frame was ready (or it carried no bins),
///   negative on error.
///   An invalid slot is skipped and reported as `VIZSHM_ERROR_INVALID_FRAME`.
///
/// # Safety
/// `out_magnitude` must have room for `capacity` floats.
#[no_mangle]
pub unsafe extern "C" fn vizshm_reader_read(
    handle: *mut ReaderHandle,
    timeout_ms: u32,
    out_header: *mut WireHeader,
    out_magnitude: *mut f32,
    capacity: usize,
) -> i32 {
    if handle.is_null() || out_magnitude.is_null() {
        return VIZSHM_ERROR_NULL_POINTER;
    }

    let reader = &mut (*handle).inner;
    let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms as u64));

    match reader.read_next(timeout) {
        Ok(ReadOutcome::Frame(frame)) => {
            if !out_header.is_null() {
                ptr::write_unaligned(out_header, WireHeader::from(&frame.header));
            }
            let n = frame.magnitude.len().min(capacity);
            ptr::copy_nonoverlapping(frame.magnitude.as_ptr(), out_magnitude, n);
            n as i32
        }
        Ok(ReadOutcome::Empty) => VIZSHM_EMPTY,
        Ok(ReadOutcome::Invalid { .. }) => VIZSHM_ERROR_INVALID_FRAME,
        Err(e) => error_code(&e),
    }
}

/// Free a reader handle.
///
/// # Safety
/// `handle` must come from `vizshm_reader_new` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn vizshm_reader_free(handle: *mut ReaderHandle) {
    if !handle.is_null() {
        let _ = Box::from_raw(handle);
    }
}

// -----------------------------------------------------------------------------
// Cleanup
// -----------------------------------------------------------------------------

/// Unlink the segment and counter (NULL for defaults). Absent resources are
/// not an error.
///
/// # Safety
/// Non-NULL names must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn vizshm_unlink(segment: *const c_char, counter: *const c_char) -> i32 {
    let (Ok(segment), Ok(counter)) = (opt_str(segment), opt_str(counter)) else {
        return VIZSHM_ERROR_INVALID_ARG;
    };
    let segment = segment.unwrap_or(crate::Transport::Frame::Header::DEFAULT_SEGMENT_NAME);
    let counter = counter.unwrap_or(crate::Transport::Frame::Header::DEFAULT_COUNTER_NAME);
    match unlink_resources(segment, counter) {
        Ok(_) => VIZSHM_SUCCESS,
        Err(e) => error_code(&e),
    }
}
