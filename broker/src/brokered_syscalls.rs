use libc::{c_char, c_int, c_uint, mode_t, F_OK, O_CLOEXEC, O_CREAT, O_RDONLY, O_RDWR, PATH_MAX};
use log::warn;
use std::ffi::CStr;
use sysbroker_ipc::{errno, Handle};
use sysbroker_policy::{BrokerPolicy, PolicyRequest, PolicyVerdict};

/// Result of a brokered syscall, before it is encoded as a reply.
pub(crate) struct Response {
    pub(crate) result: c_int,
    pub(crate) payload: Option<Vec<u8>>,
    pub(crate) handle: Option<Handle>,
}

impl Response {
    fn code(result: c_int) -> Self {
        Self {
            result,
            payload: None,
            handle: None,
        }
    }

    fn denied<P: BrokerPolicy + ?Sized>(policy: &P) -> Self {
        Self::code(-policy.denied_errno())
    }

    fn last_os_error() -> Self {
        Self::code(-errno())
    }
}

// Only the path returned by the policy may reach the kernel: the one from
// the request is attacker-controlled.
fn allowed_to_access<'a, P: BrokerPolicy + ?Sized>(policy: &'a P, path: &'a CStr, mode: c_int) -> Option<&'a CStr> {
    match policy.evaluate_request(&PolicyRequest::FileAccess { path, mode }) {
        PolicyVerdict::Granted { path, .. } => Some(path),
        _ => None,
    }
}

fn allowed_to_open<'a, P: BrokerPolicy + ?Sized>(
    policy: &'a P,
    path: &'a CStr,
    flags: c_int,
) -> Option<(&'a CStr, bool)> {
    match policy.evaluate_request(&PolicyRequest::FileOpen { path, flags }) {
        PolicyVerdict::Granted {
            path,
            unlink_after_open,
        } => Some((path, unlink_after_open)),
        _ => None,
    }
}

pub(crate) fn access_file<P: BrokerPolicy + ?Sized>(policy: &P, path: &CStr, mode: c_int) -> Response {
    let canonical_path = match allowed_to_access(policy, path, mode) {
        Some(path) => path,
        None => return Response::denied(policy),
    };
    if unsafe { libc::access(canonical_path.as_ptr(), mode) } < 0 {
        return Response::last_os_error();
    }
    Response::code(0)
}

pub(crate) fn open_file<P: BrokerPolicy + ?Sized>(policy: &P, path: &CStr, flags: c_int) -> Response {
    let (canonical_path, unlink_after_open) = match allowed_to_open(policy, path, flags) {
        Some(grant) => grant,
        None => return Response::denied(policy),
    };
    let mode = if (flags & O_CREAT) != 0 {
        libc::S_IRUSR | libc::S_IWUSR
    } else {
        0
    };
    // Our own copy must not leak into processes we might spawn.
    let fd = sys_open(canonical_path, flags | O_CLOEXEC, mode);
    if fd < 0 {
        return Response::last_os_error();
    }
    // Cannot fail, fd is non-negative
    let handle = match unsafe { Handle::from_raw(fd.into()) } {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Unable to wrap opened file descriptor: {:?}", e);
            return Response::code(-libc::ENOMEM);
        }
    };
    if unlink_after_open && unsafe { libc::unlink(canonical_path.as_ptr()) } < 0 {
        warn!(
            "Unable to unlink temporary file {:?}: errno {}",
            canonical_path,
            errno()
        );
    }
    Response {
        result: 0,
        payload: None,
        handle: Some(handle),
    }
}

pub(crate) fn stat_file<P: BrokerPolicy + ?Sized>(policy: &P, path: &CStr, follow_links: bool) -> Response {
    let canonical_path = match allowed_to_access(policy, path, F_OK) {
        Some(path) => path,
        None => return Response::denied(policy),
    };
    let mut sb: libc::stat = unsafe { std::mem::zeroed() };
    let res = unsafe {
        if follow_links {
            libc::stat(canonical_path.as_ptr(), &mut sb)
        } else {
            libc::lstat(canonical_path.as_ptr(), &mut sb)
        }
    };
    if res < 0 {
        return Response::last_os_error();
    }
    Response {
        result: res,
        payload: Some(struct_bytes(&sb)),
        handle: None,
    }
}

pub(crate) fn stat64_file<P: BrokerPolicy + ?Sized>(policy: &P, path: &CStr, follow_links: bool) -> Response {
    let canonical_path = match allowed_to_access(policy, path, F_OK) {
        Some(path) => path,
        None => return Response::denied(policy),
    };
    let mut sb: libc::stat64 = unsafe { std::mem::zeroed() };
    let res = unsafe {
        if follow_links {
            libc::stat64(canonical_path.as_ptr(), &mut sb)
        } else {
            libc::lstat64(canonical_path.as_ptr(), &mut sb)
        }
    };
    if res < 0 {
        return Response::last_os_error();
    }
    Response {
        result: res,
        payload: Some(struct_bytes(&sb)),
        handle: None,
    }
}

pub(crate) fn rename_file<P: BrokerPolicy + ?Sized>(policy: &P, old_path: &CStr, new_path: &CStr) -> Response {
    // Renaming a temporary file would let it survive its unlink.
    let (old_path, new_path) = match (
        allowed_to_open(policy, old_path, O_RDWR),
        allowed_to_open(policy, new_path, O_RDWR),
    ) {
        (Some((old_path, false)), Some((new_path, false))) => (old_path, new_path),
        _ => return Response::denied(policy),
    };
    if unsafe { libc::rename(old_path.as_ptr(), new_path.as_ptr()) } < 0 {
        return Response::last_os_error();
    }
    Response::code(0)
}

pub(crate) fn readlink_file<P: BrokerPolicy + ?Sized>(policy: &P, path: &CStr) -> Response {
    let (canonical_path, _) = match allowed_to_open(policy, path, O_RDONLY) {
        Some(grant) => grant,
        None => return Response::denied(policy),
    };
    let mut target = vec![0u8; PATH_MAX as usize];
    let res = unsafe {
        libc::readlink(
            canonical_path.as_ptr(),
            target.as_mut_ptr() as *mut c_char,
            target.len(),
        )
    };
    if res < 0 {
        return Response::last_os_error();
    }
    target.truncate(res as usize);
    Response {
        result: res as c_int,
        payload: Some(target),
        handle: None,
    }
}

// Direct syscall, so that hooks installed on libc's open() in this process
// do not apply. Dynamic analysis tools may refuse unknown syscalls with
// ENOSYS, in which case the libc wrapper is the only way.
fn sys_open(path: &CStr, flags: c_int, mode: mode_t) -> c_int {
    let res = unsafe {
        libc::syscall(
            libc::SYS_openat,
            libc::AT_FDCWD,
            path.as_ptr(),
            flags,
            mode as c_uint,
        )
    };
    if res < 0 && errno() == libc::ENOSYS {
        return unsafe { libc::open(path.as_ptr(), flags, mode as c_uint) };
    }
    res as c_int
}

fn struct_bytes<T: Copy>(value: &T) -> Vec<u8> {
    // Plain C structure, every byte is initialized by zeroed() then the kernel
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>()) }.to_vec()
}
