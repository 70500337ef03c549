// Backend selection: which OS objects back a segment and its counter.

use std::ffi::CString;
use std::fmt::Debug;

use super::heap::{HeapCounter, HeapSegment};
use super::semaphore::FlowCounter;
use super::SharedMemory::{AccessMode, SharedSegment};
use crate::error::{Result, VizError};

/// Longest name accepted. Linux prefixes semaphore names with `sem.`, which
/// leaves 251 bytes of NAME_MAX.
pub const MAX_NAME_LEN: usize = 250;

/// Factory for the named resources behind a transport.
///
/// The transport and reader only ever see the boxed [`SharedSegment`] and
/// [`FlowCounter`] trait objects.
pub trait IpcBackend: Send + Sync + Debug {
    fn create_segment(&self, name: &str, size: usize) -> Result<Box<dyn SharedSegment>>;

    fn attach_segment(&self, name: &str, access: AccessMode) -> Result<Box<dyn SharedSegment>>;

    /// Remove the named segment; `Ok(false)` if it was already gone.
    fn unlink_segment(&self, name: &str) -> Result<bool>;

    fn create_counter(&self, name: &str) -> Result<Box<dyn FlowCounter>>;

    fn attach_counter(&self, name: &str) -> Result<Box<dyn FlowCounter>>;

    /// Remove the named counter; `Ok(false)` if it was already gone.
    fn unlink_counter(&self, name: &str) -> Result<bool>;
}

/// POSIX shared memory and named semaphores, visible to other processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixBackend;

/// Process-local registry. Same semantics, no OS objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapBackend;

/// Normalise to the `/name` form POSIX expects. `"viz"` and `"/viz"` refer to
/// the same resource.
pub fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim_start_matches('/');
    let invalid = |message: &str| VizError::InvalidName {
        name: name.to_string(),
        message: message.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("name is empty"));
    }
    if trimmed.contains('/') {
        return Err(invalid("name may not contain '/' after the leading slash"));
    }
    if trimmed.contains('\0') {
        return Err(invalid("name may not contain NUL bytes"));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(invalid("name is too long"));
    }
    Ok(format!("/{trimmed}"))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn os_name(name: &str) -> Result<(String, CString)> {
    let name = normalize_name(name)?;
    let c_name = CString::new(name.as_str()).map_err(|_| VizError::InvalidName {
        name: name.clone(),
        message: "name may not contain NUL bytes".to_string(),
    })?;
    Ok((name, c_name))
}

#[cfg(target_os = "linux")]
impl IpcBackend for PosixBackend {
    fn create_segment(&self, name: &str, size: usize) -> Result<Box<dyn SharedSegment>> {
        Ok(Box::new(super::SharedMemory::PosixSegment::create(name, size)?))
    }

    fn attach_segment(&self, name: &str, access: AccessMode) -> Result<Box<dyn SharedSegment>> {
        Ok(Box::new(super::SharedMemory::PosixSegment::attach(name, access)?))
    }

    fn unlink_segment(&self, name: &str) -> Result<bool> {
        super::SharedMemory::unlink_segment(name)
    }

    fn create_counter(&self, name: &str) -> Result<Box<dyn FlowCounter>> {
        Ok(Box::new(super::semaphore::PosixCounter::create(name)?))
    }

    fn attach_counter(&self, name: &str) -> Result<Box<dyn FlowCounter>> {
        Ok(Box::new(super::semaphore::PosixCounter::attach(name)?))
    }

    fn unlink_counter(&self, name: &str) -> Result<bool> {
        super::semaphore::unlink_counter(name)
    }
}

#[cfg(not(target_os = "linux"))]
const UNSUPPORTED: &str = "POSIX shared memory transport only supported on Linux";

#[cfg(not(target_os = "linux"))]
impl IpcBackend for PosixBackend {
    fn create_segment(&self, _name: &str, _size: usize) -> Result<Box<dyn SharedSegment>> {
        Err(VizError::Unsupported(UNSUPPORTED))
    }

    fn attach_segment(&self, _name: &str, _access: AccessMode) -> Result<Box<dyn SharedSegment>> {
        Err(VizError::Unsupported(UNSUPPORTED))
    }

    fn unlink_segment(&self, _name: &str) -> Result<bool> {
        Err(VizError::Unsupported(UNSUPPORTED))
    }

    fn create_counter(&self, _name: &str) -> Result<Box<dyn FlowCounter>> {
        Err(VizError::Unsupported(UNSUPPORTED))
    }

    fn attach_counter(&self, _name: &str) -> Result<Box<dyn FlowCounter>> {
        Err(VizError::Unsupported(UNSUPPORTED))
    }

    fn unlink_counter(&self, _name: &str) -> Result<bool> {
        Err(VizError::Unsupported(UNSUPPORTED))
    }
}

impl IpcBackend for HeapBackend {
    fn create_segment(&self, name: &str, size: usize) -> Result<Box<dyn SharedSegment>> {
        Ok(Box::new(HeapSegment::create(name, size)?))
    }

    fn attach_segment(&self, name: &str, access: AccessMode) -> Result<Box<dyn SharedSegment>> {
        Ok(Box::new(HeapSegment::attach(name, access)?))
    }

    fn unlink_segment(&self, name: &str) -> Result<bool> {
        HeapSegment::unlink(name)
    }

    fn create_counter(&self, name: &str) -> Result<Box<dyn FlowCounter>> {
        Ok(Box::new(HeapCounter::create(name)?))
    }

    fn attach_counter(&self, name: &str) -> Result<Box<dyn FlowCounter>> {
        Ok(Box::new(HeapCounter::attach(name)?))
    }

    fn unlink_counter(&self, name: &str) -> Result<bool> {
        HeapCounter::unlink(name)
    }
}
