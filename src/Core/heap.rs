// In-process backend with the same naming and lifetime rules as the POSIX one.
// Unlinking removes the name from the registry; handles that are already open
// keep their storage, just like an unlinked-but-mapped shm segment.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use parking_lot::{Condvar, Mutex, RwLock};

use super::semaphore::FlowCounter;
use super::SharedMemory::{check_bounds, AccessMode, SharedSegment};
use crate::error::{ResourceKind, Result, VizError};

type SegmentStorage = Arc<RwLock<Box<[u8]>>>;

#[derive(Debug, Default)]
struct CounterCell {
    value: Mutex<u32>,
    ready: Condvar,
}

lazy_static! {
    static ref SEGMENTS: Mutex<HashMap<String, SegmentStorage>> = Mutex::new(HashMap::new());
    static ref COUNTERS: Mutex<HashMap<String, Arc<CounterCell>>> = Mutex::new(HashMap::new());
}

pub struct HeapSegment {
    name: String,
    size: usize,
    data: SegmentStorage,
    access: AccessMode,
}

impl HeapSegment {
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let name = super::backend::normalize_name(name)?;
        if size == 0 {
            return Err(VizError::invalid_config("total_size", "must be non-zero"));
        }
        let data: SegmentStorage = Arc::new(RwLock::new(vec![0u8; size].into_boxed_slice()));
        if SEGMENTS.lock().insert(name.clone(), data.clone()).is_some() {
            tracing::info!(segment = %name, "replaced stale in-process segment");
        }
        tracing::debug!(segment = %name, size, "created in-process segment");
        Ok(Self {
            name,
            size,
            data,
            access: AccessMode::ReadWrite,
        })
    }

    pub fn attach(name: &str, access: AccessMode) -> Result<Self> {
        let name = super::backend::normalize_name(name)?;
        let data = SEGMENTS
            .lock()
            .get(&name)
            .cloned()
            .ok_or_else(|| VizError::NotFound {
                kind: ResourceKind::Segment,
                name: name.clone(),
            })?;
        let size = data.read().len();
        Ok(Self {
            name,
            size,
            data,
            access,
        })
    }

    pub fn unlink(name: &str) -> Result<bool> {
        let name = super::backend::normalize_name(name)?;
        Ok(SEGMENTS.lock().remove(&name).is_some())
    }
}

impl fmt::Debug for HeapSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapSegment")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl SharedSegment for HeapSegment {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.size
    }

    fn access(&self) -> AccessMode {
        self.access
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if self.access == AccessMode::ReadOnly {
            return Err(VizError::ReadOnly {
                name: self.name.clone(),
            });
        }
        check_bounds(offset, bytes.len(), self.size)?;
        self.data.write()[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len(), self.size)?;
        buf.copy_from_slice(&self.data.read()[offset..offset + buf.len()]);
        Ok(())
    }
}

#[derive(Debug)]
pub struct HeapCounter {
    name: String,
    cell: Arc<CounterCell>,
}

impl HeapCounter {
    pub fn create(name: &str) -> Result<Self> {
        let name = super::backend::normalize_name(name)?;
        let cell = Arc::new(CounterCell::default());
        if COUNTERS.lock().insert(name.clone(), cell.clone()).is_some() {
            tracing::info!(counter = %name, "replaced stale in-process counter");
        }
        Ok(Self { name, cell })
    }

    pub fn attach(name: &str) -> Result<Self> {
        let name = super::backend::normalize_name(name)?;
        let cell = COUNTERS
            .lock()
            .get(&name)
            .cloned()
            .ok_or_else(|| VizError::NotFound {
                kind: ResourceKind::Counter,
                name: name.clone(),
            })?;
        Ok(Self { name, cell })
    }

    pub fn unlink(name: &str) -> Result<bool> {
        let name = super::backend::normalize_name(name)?;
        Ok(COUNTERS.lock().remove(&name).is_some())
    }
}

impl FlowCounter for HeapCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Result<u32> {
        Ok(*self.cell.value.lock())
    }

    fn signal(&self) -> Result<()> {
        let mut value = self.cell.value.lock();
        *value = value.saturating_add(1);
        self.cell.ready.notify_one();
        Ok(())
    }

    fn try_wait(&self) -> Result<bool> {
        let mut value = self.cell.value.lock();
        if *value == 0 {
            return Ok(false);
        }
        *value -= 1;
        Ok(true)
    }

    fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now().checked_add(timeout);
        let mut value = self.cell.value.lock();
        while *value == 0 {
            match deadline {
                Some(deadline) => {
                    if self.cell.ready.wait_until(&mut value, deadline).timed_out() && *value == 0 {
                        return Ok(false);
                    }
                }
                // Too far out to represent: wait without a deadline.
                None => self.cell.ready.wait(&mut value),
            }
        }
        *value -= 1;
        Ok(true)
    }
}
