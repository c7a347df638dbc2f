use crate::error::PolicyError;
use crate::path::{path_is_sane, strip_one_component, strip_trailing_separator};
use crate::{BrokerPolicy, PolicyRequest, PolicyVerdict};
use libc::c_int;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FileAccess {
    pub(crate) read: bool,
    pub(crate) write: bool,
    pub(crate) create: bool,
    pub(crate) unlink_after_open: bool,
}

impl FileAccess {
    fn merge(&mut self, other: &FileAccess) {
        self.read |= other.read;
        self.write |= other.write;
        self.create |= other.create;
        self.unlink_after_open |= other.unlink_after_open;
    }
}

pub type PolicyLogCallback = dyn Fn(&PolicyRequest, &PolicyVerdict) + Send + Sync;

/// Path-based filesystem policy.
///
/// File rules apply to one exact path, directory rules to a directory and
/// everything below it. Rights granted by all matching rules are combined.
/// The same policy is meant to be configured in the broker, then handed to
/// the sandboxed process (see [`Policy::to_bytes`]) so that both sides agree.
#[derive(Serialize, Deserialize, Clone)]
pub struct Policy {
    #[serde(skip)]
    pub(crate) log_callbacks: Vec<Arc<PolicyLogCallback>>,
    pub(crate) file_access: HashMap<CString, FileAccess>,
    pub(crate) dir_access: HashMap<Vec<u8>, FileAccess>,
    pub(crate) denied_errno: c_int,
}

impl Policy {
    pub fn nothing_allowed() -> Self {
        Self {
            log_callbacks: vec![],
            file_access: HashMap::new(),
            dir_access: HashMap::new(),
            denied_errno: libc::EPERM,
        }
    }

    // Takes a callback that will receive notifications whenever the broker
    // takes a decision. Multiple callbacks can be registered, they all need to be
    // multithread-safe. They are never called from the sandboxed process.
    pub fn add_log_callback(&mut self, callback: Box<PolicyLogCallback>) {
        self.log_callbacks.push(Arc::from(callback));
    }

    pub fn set_denied_errno(&mut self, errno: c_int) -> Result<(), PolicyError> {
        if errno <= 0 {
            return Err(PolicyError::InvalidDeniedErrno { errno });
        }
        self.denied_errno = errno;
        Ok(())
    }

    fn allow_file_access(&mut self, path: &str, dir: bool, access: FileAccess) -> Result<(), PolicyError> {
        let unsupported = || PolicyError::UnsupportedFilesystemPath {
            path: path.to_owned(),
        };
        if !path_is_sane(path.as_bytes()) {
            return Err(unsupported());
        }
        if dir {
            let key = strip_trailing_separator(path.as_bytes()).to_vec();
            self.dir_access.entry(key).or_default().merge(&access);
        } else {
            if path.ends_with('/') {
                return Err(unsupported());
            }
            let key = CString::new(path).map_err(|_| unsupported())?;
            self.file_access.entry(key).or_default().merge(&access);
        }
        Ok(())
    }

    pub fn allow_file_read(&mut self, path: &str) -> Result<(), PolicyError> {
        self.allow_file_access(path, false, FileAccess { read: true, ..FileAccess::default() })
    }

    pub fn allow_file_write(&mut self, path: &str) -> Result<(), PolicyError> {
        self.allow_file_access(path, false, FileAccess { write: true, ..FileAccess::default() })
    }

    /// Read, write, and creation of one file.
    pub fn allow_file_create(&mut self, path: &str) -> Result<(), PolicyError> {
        self.allow_file_access(
            path,
            false,
            FileAccess { read: true, write: true, create: true, unlink_after_open: false },
        )
    }

    /// Creation of one file which is unlinked as soon as it is opened, so that
    /// only the returned file descriptor gives access to it.
    pub fn allow_file_temporary(&mut self, path: &str) -> Result<(), PolicyError> {
        self.allow_file_access(
            path,
            false,
            FileAccess { read: true, write: true, create: true, unlink_after_open: true },
        )
    }

    pub fn allow_dir_read(&mut self, path: &str) -> Result<(), PolicyError> {
        self.allow_file_access(path, true, FileAccess { read: true, ..FileAccess::default() })
    }

    pub fn allow_dir_write(&mut self, path: &str) -> Result<(), PolicyError> {
        self.allow_file_access(path, true, FileAccess { write: true, ..FileAccess::default() })
    }

    pub fn allow_dir_create(&mut self, path: &str) -> Result<(), PolicyError> {
        self.allow_file_access(
            path,
            true,
            FileAccess { read: true, write: true, create: true, unlink_after_open: false },
        )
    }

    /// Serialized form of the rules, log callbacks excluded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PolicyError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PolicyError> {
        let policy: Policy = postcard::from_bytes(bytes)?;
        // Rules built by allow_*() are always sane, anything else did not come
        // from a Policy.
        for path in policy.file_access.keys() {
            if !path_is_sane(path.to_bytes()) {
                return Err(PolicyError::UnsupportedFilesystemPath {
                    path: path.to_string_lossy().into_owned(),
                });
            }
        }
        for path in policy.dir_access.keys() {
            if !path.is_empty() && !path_is_sane(path) {
                return Err(PolicyError::UnsupportedFilesystemPath {
                    path: String::from_utf8_lossy(path).into_owned(),
                });
            }
        }
        if policy.denied_errno <= 0 {
            return Err(PolicyError::InvalidDeniedErrno {
                errno: policy.denied_errno,
            });
        }
        Ok(policy)
    }

    // Combined rights for `path`, and the path the broker should operate on:
    // our own copy of it if an exact file rule matched, the (validated)
    // requested path otherwise.
    pub(crate) fn get_filepath_allowed_access<'a>(&'a self, path: &'a CStr) -> (FileAccess, &'a CStr) {
        let mut verdict = FileAccess::default();
        let mut canonical_path = path;
        if let Some((rule_path, access)) = self.file_access.get_key_value(path) {
            verdict.merge(access);
            canonical_path = rule_path.as_c_str();
        }
        let mut current_path = strip_trailing_separator(path.to_bytes());
        loop {
            if let Some(access) = self.dir_access.get(current_path) {
                verdict.merge(access);
            }
            match strip_one_component(current_path) {
                Some(parent_path) => current_path = parent_path,
                None => break,
            }
        }
        (verdict, canonical_path)
    }

    pub(crate) fn log_verdict(&self, request: &PolicyRequest, verdict: &PolicyVerdict) {
        match &verdict {
            PolicyVerdict::Granted { .. } => {
                info!("Worker granted access to {}", request);
            }
            PolicyVerdict::DelegationToSandboxNotSupported { why } => {
                warn!("Worker tried to access {} but delegation is not supported: {}", request, why);
            }
            PolicyVerdict::DeniedByPolicy { why } => {
                warn!("Worker tried to access {} but it is not allowed by its policy: {}", request, why);
            }
            PolicyVerdict::InvalidRequestParameters { argument_name, why } => {
                warn!("Worker tried to access {} but \"{}\" was unexpected: {}", request, argument_name, why);
            }
        }
        for callback in &self.log_callbacks {
            (callback)(request, verdict);
        }
    }
}

impl BrokerPolicy for Policy {
    fn check_request<'a>(&'a self, request: &PolicyRequest<'a>) -> PolicyVerdict<'a> {
        match *request {
            PolicyRequest::FileOpen { path, flags } => self.check_file_open(path, flags),
            PolicyRequest::FileAccess { path, mode } => self.check_file_access(path, mode),
        }
    }

    fn denied_errno(&self) -> c_int {
        self.denied_errno
    }

    fn evaluate_request<'a>(&'a self, request: &PolicyRequest<'a>) -> PolicyVerdict<'a> {
        let verdict = self.check_request(request);
        self.log_verdict(request, &verdict);
        verdict
    }
}

impl core::fmt::Debug for Policy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let Policy { log_callbacks: _, file_access, dir_access, denied_errno } = &self;
        writeln!(f, "Policy {{")?;
        for (path, access) in file_access {
            writeln!(f, "    {} file{}", path.to_string_lossy(), describe(access))?;
        }
        for (path, access) in dir_access {
            let path = String::from_utf8_lossy(path);
            writeln!(f, "    {}/ directory{}", path, describe(access))?;
        }
        writeln!(f, "    denied with errno {}", denied_errno)?;
        write!(f, "}}")?;
        Ok(())
    }
}

fn describe(access: &FileAccess) -> String {
    format!(
        "{}{}{}{}",
        if access.read { " read" } else { "" },
        if access.write { " write" } else { "" },
        if access.create { " create" } else { "" },
        if access.unlink_after_open { " temporary" } else { "" },
    )
}

impl PartialEq for Policy {
    fn eq(&self, other: &Policy) -> bool {
        let Policy {
            log_callbacks: _,
            file_access: file_access_a,
            dir_access: dir_access_a,
            denied_errno: denied_errno_a,
        } = &self;
        let Policy {
            log_callbacks: _,
            file_access: file_access_b,
            dir_access: dir_access_b,
            denied_errno: denied_errno_b,
        } = &other;

        file_access_a == file_access_b && dir_access_a == dir_access_b && denied_errno_a == denied_errno_b
    }
}
