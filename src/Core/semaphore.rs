// Flow-control counter: a named counting semaphore whose value approximates the
// number of written-but-unread slots. Producer posts, consumer waits.

use std::fmt::Debug;
use std::time::Duration;

use crate::error::Result;

/// Counting primitive shared between producer and consumer.
///
/// Nothing here is a lock: the producer only ever calls [`value`](Self::value)
/// and [`signal`](Self::signal), neither of which blocks.
pub trait FlowCounter: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Current count of unread slots.
    fn value(&self) -> Result<u32>;

    /// Increment by one (a new slot is ready).
    fn signal(&self) -> Result<()>;

    /// Decrement by one if the count is positive. Returns `false` when the
    /// count was zero.
    fn try_wait(&self) -> Result<bool>;

    /// Decrement by one, waiting up to `timeout` for the count to become
    /// positive. Returns `false` on timeout.
    fn wait_timeout(&self, timeout: Duration) -> Result<bool>;
}

#[cfg(target_os = "linux")]
pub use linux::{unlink_counter, PosixCounter};

#[cfg(target_os = "linux")]
mod linux {
    use std::io;
    use std::time::Duration;

    use super::FlowCounter;
    use crate::error::{ResourceKind, Result, VizError};

    /// POSIX named semaphore (`sem_open`).
    #[derive(Debug)]
    pub struct PosixCounter {
        name: String,
        sem: *mut libc::sem_t,
    }

    // sem_* calls are thread-safe on a shared handle.
    unsafe impl Send for PosixCounter {}
    unsafe impl Sync for PosixCounter {}

    impl PosixCounter {
        /// Create the counter at zero, replacing any stale one.
        pub fn create(name: &str) -> Result<Self> {
            let (name, c_name) = crate::Core::backend::os_name(name)?;

            if unlink_counter(&name)? {
                tracing::info!(counter = %name, "removed stale flow-control counter");
            }

            let sem = unsafe {
                libc::sem_open(
                    c_name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    0o600 as libc::c_uint,
                    0 as libc::c_uint,
                )
            };
            if sem == libc::SEM_FAILED {
                return Err(VizError::create(
                    ResourceKind::Counter,
                    &name,
                    io::Error::last_os_error(),
                ));
            }

            tracing::info!(counter = %name, "created flow-control counter");
            Ok(Self { name, sem })
        }

        pub fn attach(name: &str) -> Result<Self> {
            let (name, c_name) = crate::Core::backend::os_name(name)?;
            let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
            if sem == libc::SEM_FAILED {
                return Err(VizError::attach(
                    ResourceKind::Counter,
                    &name,
                    io::Error::last_os_error(),
                ));
            }
            tracing::info!(counter = %name, "attached to flow-control counter");
            Ok(Self { name, sem })
        }
    }

    /// Remove the named semaphore. Returns `false` if it did not exist.
    pub fn unlink_counter(name: &str) -> Result<bool> {
        let (name, c_name) = crate::Core::backend::os_name(name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::NotFound {
            return Ok(false);
        }
        tracing::error!(counter = %name, error = %err, "sem_unlink failed");
        Err(VizError::Io(err))
    }

    fn deadline(timeout: Duration) -> io::Result<libc::timespec> {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let secs = libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX);
        let mut sec = now.tv_sec.saturating_add(secs);
        let mut nsec = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
        if nsec >= 1_000_000_000 {
            if sec == libc::time_t::MAX {
                nsec = 999_999_999;
            } else {
                sec += 1;
                nsec -= 1_000_000_000;
            }
        }
        Ok(libc::timespec {
            tv_sec: sec,
            tv_nsec: nsec,
        })
    }

    impl Drop for PosixCounter {
        fn drop(&mut self) {
            unsafe {
                libc::sem_close(self.sem);
            }
        }
    }

    impl FlowCounter for PosixCounter {
        fn name(&self) -> &str {
            &self.name
        }

        fn value(&self) -> Result<u32> {
            let mut value: libc::c_int = 0;
            if unsafe { libc::sem_getvalue(self.sem, &mut value) } != 0 {
                return Err(VizError::Io(io::Error::last_os_error()));
            }
            // Some implementations report waiters as a negative count.
            Ok(value.max(0) as u32)
        }

        fn signal(&self) -> Result<()> {
            if unsafe { libc::sem_post(self.sem) } != 0 {
                return Err(VizError::Io(io::Error::last_os_error()));
            }
            Ok(())
        }

        fn try_wait(&self) -> Result<bool> {
            loop {
                if unsafe { libc::sem_trywait(self.sem) } == 0 {
                    return Ok(true);
                }
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EAGAIN) => return Ok(false),
                    Some(libc::EINTR) => continue,
                    _ => return Err(VizError::Io(err)),
                }
            }
        }

        fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
            let ts = deadline(timeout)?;
            loop {
                if unsafe { libc::sem_timedwait(self.sem, &ts) } == 0 {
                    return Ok(true);
                }
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::ETIMEDOUT) => return Ok(false),
                    Some(libc::EINTR) => continue,
                    _ => return Err(VizError::Io(err)),
                }
            }
        }
    }
}
