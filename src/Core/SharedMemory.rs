// Shared memory segment abstraction.
// POSIX backend uses shm_open + ftruncate + mmap so that an external renderer can
// open the same segment by name.

use std::fmt::Debug;

use crate::error::{Result, VizError};

/// How a process maps a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// A named, fixed-size region of memory shared with other processes.
///
/// Dropping a segment releases this process's mapping only; the named object
/// survives until it is unlinked.
pub trait SharedSegment: Send + Sync + Debug {
    /// Normalised resource name (always starts with `/`).
    fn name(&self) -> &str;

    /// Size of the mapped region in bytes.
    fn size(&self) -> usize;

    fn access(&self) -> AccessMode;

    /// Copy `bytes` into the segment at `offset` in a single call.
    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` from the segment starting at `offset`.
    fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()>;

    fn read_at(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }
}

/// Reject any access that would run past the end of the segment.
pub(crate) fn check_bounds(offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(VizError::OutOfBounds { offset, len, size }),
    }
}

#[cfg(target_os = "linux")]
pub use linux::{unlink_segment, PosixSegment};

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CString;
    use std::io;
    use std::ptr::{self, NonNull};

    use super::{check_bounds, AccessMode, SharedSegment};
    use crate::error::{ResourceKind, Result, VizError};

    /// POSIX named shared memory mapped with `MAP_SHARED`.
    #[derive(Debug)]
    pub struct PosixSegment {
        name: String,
        ptr: NonNull<u8>,
        size: usize,
        fd: i32,
        access: AccessMode,
    }

    // The mapping is plain bytes; exclusive writes go through `&mut self`.
    unsafe impl Send for PosixSegment {}
    unsafe impl Sync for PosixSegment {}

    impl PosixSegment {
        /// Create a segment of `size` bytes, replacing any stale segment left
        /// by a crashed producer.
        pub fn create(name: &str, size: usize) -> Result<Self> {
            let (name, c_name) = crate::Core::backend::os_name(name)?;
            if size == 0 {
                return Err(VizError::invalid_config("total_size", "must be non-zero"));
            }

            if unlink_segment(&name)? {
                tracing::info!(segment = %name, "removed stale shared memory segment");
            }

            let fd = unsafe {
                libc::shm_open(
                    c_name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                    0o600 as libc::mode_t,
                )
            };
            if fd < 0 {
                return Err(VizError::create(
                    ResourceKind::Segment,
                    &name,
                    io::Error::last_os_error(),
                ));
            }

            if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
                let err = io::Error::last_os_error();
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(VizError::create(ResourceKind::Segment, &name, err));
            }

            let ptr = match map(fd, size, AccessMode::ReadWrite) {
                Ok(ptr) => ptr,
                Err(err) => {
                    unsafe {
                        libc::close(fd);
                        libc::shm_unlink(c_name.as_ptr());
                    }
                    return Err(VizError::create(ResourceKind::Segment, &name, err));
                }
            };

            tracing::info!(segment = %name, size, "created shared memory segment");
            Ok(Self {
                name,
                ptr,
                size,
                fd,
                access: AccessMode::ReadWrite,
            })
        }

        /// Attach to an existing segment; its size is taken from the object.
        pub fn attach(name: &str, access: AccessMode) -> Result<Self> {
            let (name, c_name) = crate::Core::backend::os_name(name)?;
            let oflag = match access {
                AccessMode::ReadWrite => libc::O_RDWR,
                AccessMode::ReadOnly => libc::O_RDONLY,
            };

            let fd = unsafe { libc::shm_open(c_name.as_ptr(), oflag, 0 as libc::mode_t) };
            if fd < 0 {
                return Err(VizError::attach(
                    ResourceKind::Segment,
                    &name,
                    io::Error::last_os_error(),
                ));
            }

            let size = unsafe {
                let mut stat: libc::stat = std::mem::zeroed();
                if libc::fstat(fd, &mut stat) != 0 {
                    let err = io::Error::last_os_error();
                    libc::close(fd);
                    return Err(VizError::attach(ResourceKind::Segment, &name, err));
                }
                stat.st_size as usize
            };
            if size == 0 {
                unsafe { libc::close(fd) };
                return Err(VizError::attach(
                    ResourceKind::Segment,
                    &name,
                    io::Error::new(io::ErrorKind::InvalidData, "segment has zero size"),
                ));
            }

            let ptr = map(fd, size, access).map_err(|err| {
                unsafe { libc::close(fd) };
                VizError::attach(ResourceKind::Segment, &name, err)
            })?;

            tracing::info!(segment = %name, size, ?access, "attached to shared memory segment");
            Ok(Self {
                name,
                ptr,
                size,
                fd,
                access,
            })
        }
    }

    fn map(fd: i32, size: usize, access: AccessMode) -> io::Result<NonNull<u8>> {
        let prot = match access {
            AccessMode::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            AccessMode::ReadOnly => libc::PROT_READ,
        };
        let ptr = unsafe { libc::mmap(ptr::null_mut(), size, prot, libc::MAP_SHARED, fd, 0) };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }

    /// Remove the named segment. Returns `false` if it did not exist.
    pub fn unlink_segment(name: &str) -> Result<bool> {
        let (name, c_name) = crate::Core::backend::os_name(name)?;
        unlink_with(&name, &c_name)
    }

    fn unlink_with(name: &str, c_name: &CString) -> Result<bool> {
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::NotFound {
            return Ok(false);
        }
        tracing::error!(segment = %name, error = %err, "shm_unlink failed");
        Err(VizError::Io(err))
    }

    impl Drop for PosixSegment {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
                libc::close(self.fd);
            }
        }
    }

    impl SharedSegment for PosixSegment {
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
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len());
            }
            Ok(())
        }

        fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
            check_bounds(offset, buf.len(), self.size)?;
            unsafe {
                ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
            }
            Ok(())
        }
    }
}
