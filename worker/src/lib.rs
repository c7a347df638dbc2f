#![cfg(target_os = "linux")]

//! Sandboxed side of the broker: turns filesystem syscalls into broker
//! requests. Every entry point can be called from a SIGSYS handler, it
//! neither allocates nor takes locks, and reports failures as `-errno`.

#[macro_use]
mod rawlog;
mod client;

pub use client::BrokerClient;

use libc::c_char;
use std::ffi::CStr;

/// Borrows a path argument straight from syscall registers. A null pointer
/// yields None, which entry points report as -EFAULT.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for `'a`.
pub unsafe fn path_from_ptr<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr))
    }
}
