#![cfg(target_os = "linux")]

// Common modules
mod error;
mod path;
mod policy;
mod request;

pub use error::PolicyError;
pub use policy::{Policy, PolicyLogCallback};
pub use request::{
    PolicyRequest, PolicyVerdict, CURRENT_PROCESS_OPEN_FLAGS_MASK, KNOWN_OPEN_FLAGS,
};

use libc::c_int;
use std::ffi::CStr;

/// Decisions a broker needs to take about filesystem requests.
///
/// Implementations are shared between the sandboxed client (advisory fast
/// check, possibly from a signal handler) and the broker host (authoritative
/// check). `check_request()` must therefore neither allocate nor log.
pub trait BrokerPolicy {
    fn check_request<'a>(&'a self, request: &PolicyRequest<'a>) -> PolicyVerdict<'a>;

    /// Positive errno value reported to the sandboxed process on denial.
    fn denied_errno(&self) -> c_int;

    /// Authoritative evaluation on the broker side, free to log.
    fn evaluate_request<'a>(&'a self, request: &PolicyRequest<'a>) -> PolicyVerdict<'a> {
        self.check_request(request)
    }

    /// Path to actually open, and whether to unlink it right after opening.
    fn file_name_if_allowed_to_open<'a>(
        &'a self,
        path: &'a CStr,
        flags: c_int,
    ) -> Option<(&'a CStr, bool)> {
        match self.check_request(&PolicyRequest::FileOpen { path, flags }) {
            PolicyVerdict::Granted {
                path,
                unlink_after_open,
            } => Some((path, unlink_after_open)),
            _ => None,
        }
    }

    fn file_name_if_allowed_to_access<'a>(&'a self, path: &'a CStr, mode: c_int) -> Option<&'a CStr> {
        match self.check_request(&PolicyRequest::FileAccess { path, mode }) {
            PolicyVerdict::Granted { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl<P: BrokerPolicy + ?Sized> BrokerPolicy for std::sync::Arc<P> {
    fn check_request<'a>(&'a self, request: &PolicyRequest<'a>) -> PolicyVerdict<'a> {
        (**self).check_request(request)
    }

    fn denied_errno(&self) -> c_int {
        (**self).denied_errno()
    }

    fn evaluate_request<'a>(&'a self, request: &PolicyRequest<'a>) -> PolicyVerdict<'a> {
        (**self).evaluate_request(request)
    }
}
