use crate::path::path_is_sane;
use crate::policy::{FileAccess, Policy};
use libc::{
    c_int, F_OK, O_ACCMODE, O_APPEND, O_ASYNC, O_CLOEXEC, O_CREAT, O_DIRECT, O_DIRECTORY, O_DSYNC,
    O_EXCL, O_LARGEFILE, O_NDELAY, O_NOATIME, O_NOCTTY, O_NOFOLLOW, O_NONBLOCK, O_RDONLY, O_RDWR,
    O_SYNC, O_TRUNC, O_WRONLY, R_OK, W_OK, X_OK,
};
use std::ffi::CStr;

/// Open flags which only make sense in the process that issues the open().
/// Their numeric value must never travel to the broker: the client asks for
/// their effect when receiving the file descriptor instead.
pub const CURRENT_PROCESS_OPEN_FLAGS_MASK: c_int = O_CLOEXEC;

pub const KNOWN_OPEN_FLAGS: c_int = O_ACCMODE
    | O_APPEND
    | O_ASYNC
    | O_CLOEXEC
    | O_CREAT
    | O_DIRECT
    | O_DIRECTORY
    | O_DSYNC
    | O_EXCL
    | O_LARGEFILE
    | O_NOATIME
    | O_NOCTTY
    | O_NOFOLLOW
    | O_NONBLOCK
    | O_NDELAY
    | O_SYNC
    | O_TRUNC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRequest<'a> {
    FileOpen { path: &'a CStr, flags: c_int },
    FileAccess { path: &'a CStr, mode: c_int },
}

/// Outcome of a policy check. Reasons are static strings so that verdicts
/// can be computed without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict<'a> {
    Granted {
        /// The path the broker must operate on, never the one from the request
        /// unless both are the same validated bytes.
        path: &'a CStr,
        unlink_after_open: bool,
    },
    DeniedByPolicy {
        why: &'static str,
    },
    DelegationToSandboxNotSupported {
        why: &'static str,
    },
    InvalidRequestParameters {
        argument_name: &'static str,
        why: &'static str,
    },
}

impl PolicyVerdict<'_> {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

impl Policy {
    pub(crate) fn check_file_open<'a>(&'a self, path: &'a CStr, flags: c_int) -> PolicyVerdict<'a> {
        if (flags & CURRENT_PROCESS_OPEN_FLAGS_MASK) != 0 {
            return PolicyVerdict::DelegationToSandboxNotSupported {
                why: "close-on-exec must be requested when receiving the file descriptor",
            };
        }
        if (flags & !KNOWN_OPEN_FLAGS) != 0 {
            return PolicyVerdict::DelegationToSandboxNotSupported {
                why: "open flag not supported",
            };
        }
        if !path_is_sane(path.to_bytes()) {
            return PolicyVerdict::InvalidRequestParameters {
                argument_name: "path",
                why: "path to open is not absolute or not in canonical form",
            };
        }
        let (requests_read, requests_write) = match flags & O_ACCMODE {
            O_RDONLY => (true, false),
            O_WRONLY => (false, true),
            O_RDWR => (true, true),
            _ => {
                return PolicyVerdict::InvalidRequestParameters {
                    argument_name: "flags",
                    why: "invalid access mode",
                }
            }
        };
        let requests_write = requests_write || (flags & (O_TRUNC | O_APPEND)) != 0;
        let requests_create = (flags & O_CREAT) != 0;

        let (access, canonical_path) = self.get_filepath_allowed_access(path);
        if !(access.read || access.write) {
            return PolicyVerdict::DeniedByPolicy {
                why: "has no access to that path",
            };
        }
        if requests_read && !access.read {
            return PolicyVerdict::DeniedByPolicy {
                why: "requests read access, but can only write",
            };
        }
        if requests_write && !access.write {
            return PolicyVerdict::DeniedByPolicy {
                why: "requests write access, but can only read",
            };
        }
        if requests_create && !access.create {
            return PolicyVerdict::DeniedByPolicy {
                why: "requests file creation, which is not allowed",
            };
        }
        // Temporary files must be brand new, otherwise unlinking them after
        // opening would delete a file that existed before the request.
        if access.unlink_after_open && (flags & (O_CREAT | O_EXCL)) != (O_CREAT | O_EXCL) {
            return PolicyVerdict::DeniedByPolicy {
                why: "temporary files must be created with O_CREAT|O_EXCL",
            };
        }
        PolicyVerdict::Granted {
            path: canonical_path,
            unlink_after_open: access.unlink_after_open,
        }
    }

    pub(crate) fn check_file_access<'a>(&'a self, path: &'a CStr, mode: c_int) -> PolicyVerdict<'a> {
        if (mode & !(F_OK | R_OK | W_OK | X_OK)) != 0 {
            return PolicyVerdict::InvalidRequestParameters {
                argument_name: "mode",
                why: "unknown access mode bits",
            };
        }
        if (mode & X_OK) != 0 {
            return PolicyVerdict::DeniedByPolicy {
                why: "execute access is never granted",
            };
        }
        if !path_is_sane(path.to_bytes()) {
            return PolicyVerdict::InvalidRequestParameters {
                argument_name: "path",
                why: "path to access is not absolute or not in canonical form",
            };
        }
        let (access, canonical_path) = self.get_filepath_allowed_access(path);
        if access.unlink_after_open {
            return PolicyVerdict::DeniedByPolicy {
                why: "temporary files cannot be probed",
            };
        }
        let FileAccess { read, write, .. } = access;
        let verdict = if !(read || write) {
            Some("has no access to that path")
        } else if (mode & R_OK) != 0 && !read {
            Some("requests read access, but can only write")
        } else if (mode & W_OK) != 0 && !write {
            Some("requests write access, but can only read")
        } else {
            None
        };
        match verdict {
            Some(why) => PolicyVerdict::DeniedByPolicy { why },
            None => PolicyVerdict::Granted {
                path: canonical_path,
                unlink_after_open: false,
            },
        }
    }
}

impl core::fmt::Display for PolicyRequest<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        match self {
            PolicyRequest::FileOpen { path, flags } => {
                write!(f, "file {} with flags {:#X}", path.to_string_lossy(), flags)
            }
            PolicyRequest::FileAccess { path, mode } => {
                write!(f, "file {} with access mode {:#o}", path.to_string_lossy(), mode)
            }
        }
    }
}
