use crate::error::IpcError;
use crate::errno;
use libc::c_int;
use log::error;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

/// Owned file descriptor, closed when dropped.
#[derive(Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    pub(crate) val: Option<c_int>,
}

impl Handle {
    /// Takes ownership of `raw_handle`.
    ///
    /// # Safety
    ///
    /// `raw_handle` must be an open file descriptor that nothing else will close.
    pub unsafe fn from_raw(raw_handle: i64) -> Result<Self, IpcError> {
        let fd: c_int = match c_int::try_from(raw_handle) {
            Ok(n) if n >= 0 => n,
            _ => return Err(IpcError::InvalidHandleValue { raw_value: raw_handle }),
        };
        Ok(Handle { val: Some(fd) })
    }

    pub fn as_raw(&self) -> c_int {
        // A Handle only ever loses its value in into_raw(), which consumes it
        self.val.unwrap_or(-1)
    }

    /// Releases ownership of the file descriptor without closing it.
    pub fn into_raw(mut self) -> c_int {
        self.val.take().unwrap_or(-1)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(fd) = self.val {
            let res = unsafe { libc::close(fd) };
            if res < 0 {
                // No formatting allocations in release builds: this may run
                // in a signal handler in the sandboxed process.
                if cfg!(debug_assertions) {
                    error!("close(fd={}) failed with error {}", fd, errno());
                }
            }
        }
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.as_raw()
    }
}

impl FromRawFd for Handle {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Handle { val: Some(fd) }
    }
}

impl IntoRawFd for Handle {
    fn into_raw_fd(self) -> RawFd {
        self.into_raw()
    }
}

pub fn downcast_to_handle<T: IntoRawFd>(resource: T) -> Handle {
    unsafe { Handle::from_raw_fd(resource.into_raw_fd()) }
}
