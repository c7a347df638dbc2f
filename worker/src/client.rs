use libc::{c_int, EFAULT, ENAMETOOLONG, ENOMEM, F_OK, MSG_CMSG_CLOEXEC, O_RDONLY, O_RDWR};
use std::ffi::CStr;
use std::os::unix::io::AsRawFd;
use sysbroker_ipc::{send_recv_message, Handle, IpcChannel, IpcError, Message};
use sysbroker_ipc_messages::{Reply, Request};
use sysbroker_policy::{BrokerPolicy, CURRENT_PROCESS_OPEN_FLAGS_MASK};

/// Sends filesystem requests to a broker host over an [`IpcChannel`].
///
/// The client holds the same policy as the host, so obviously denied requests
/// can be answered locally without a round trip. This is only a fast path,
/// the host re-checks everything. One client can be used from any number of
/// threads concurrently: each request gets its own reply channel.
pub struct BrokerClient<P: BrokerPolicy> {
    policy: P,
    ipc_channel: IpcChannel,
    fast_check_in_client: bool,
    quiet_failures: bool,
}

impl<P: BrokerPolicy> BrokerClient<P> {
    pub fn new(policy: P, ipc_channel: IpcChannel) -> Self {
        Self {
            policy,
            ipc_channel,
            fast_check_in_client: true,
            quiet_failures: false,
        }
    }

    /// Disabling the local check sends every request to the host, which is
    /// mostly useful to test the host's own enforcement.
    pub fn with_fast_check_in_client(mut self, enabled: bool) -> Self {
        self.fast_check_in_client = enabled;
        self
    }

    /// Do not write diagnostics to stderr when the broker cannot be reached.
    pub fn with_quiet_failures(mut self, quiet: bool) -> Self {
        self.quiet_failures = quiet;
        self
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn ipc_channel(&self) -> &IpcChannel {
        &self.ipc_channel
    }

    pub fn access(&self, pathname: Option<&CStr>, mode: c_int) -> c_int {
        let path = match pathname {
            Some(path) => path,
            None => return -EFAULT,
        };
        if self.fast_check_in_client && self.policy.file_name_if_allowed_to_access(path, mode).is_none() {
            return -self.policy.denied_errno();
        }
        self.send_request(&Request::Access { path, mode }, 0, |reply, _| reply.result)
    }

    /// Returns a new file descriptor owned by the caller, or `-errno`.
    pub fn open(&self, pathname: Option<&CStr>, flags: c_int) -> c_int {
        let path = match pathname {
            Some(path) => path,
            None => return -EFAULT,
        };
        // Close-on-exec applies to our own descriptor table, the broker has
        // no say in it. Ask the kernel to apply it on reception instead.
        let mut flags = flags;
        let mut recv_flags = 0;
        if (flags & CURRENT_PROCESS_OPEN_FLAGS_MASK) != 0 {
            flags &= !CURRENT_PROCESS_OPEN_FLAGS_MASK;
            recv_flags |= MSG_CMSG_CLOEXEC;
        }
        if self.fast_check_in_client && self.policy.file_name_if_allowed_to_open(path, flags).is_none() {
            return -self.policy.denied_errno();
        }
        self.send_request(&Request::Open { path, flags }, recv_flags, |reply, handle| {
            if reply.result < 0 {
                return reply.result;
            }
            match handle {
                Some(handle) => handle.into_raw(),
                None => {
                    raw_log!(self.quiet_failures, "Broker reported a successful open() without a file descriptor");
                    -ENOMEM
                }
            }
        })
    }

    pub fn stat(&self, pathname: Option<&CStr>, follow_links: bool, sb: &mut libc::stat) -> c_int {
        let path = match pathname {
            Some(path) => path,
            None => return -EFAULT,
        };
        if self.fast_check_in_client && self.policy.file_name_if_allowed_to_access(path, F_OK).is_none() {
            return -self.policy.denied_errno();
        }
        let request = Request::Stat { path, follow_links };
        self.send_request(&request, 0, |reply, _| self.copy_stat_reply(&reply, sb))
    }

    pub fn stat64(&self, pathname: Option<&CStr>, follow_links: bool, sb: &mut libc::stat64) -> c_int {
        let path = match pathname {
            Some(path) => path,
            None => return -EFAULT,
        };
        if self.fast_check_in_client && self.policy.file_name_if_allowed_to_access(path, F_OK).is_none() {
            return -self.policy.denied_errno();
        }
        let request = Request::Stat64 { path, follow_links };
        self.send_request(&request, 0, |reply, _| self.copy_stat_reply(&reply, sb))
    }

    pub fn rename(&self, old_pathname: Option<&CStr>, new_pathname: Option<&CStr>) -> c_int {
        let (old_path, new_path) = match (old_pathname, new_pathname) {
            (Some(old_path), Some(new_path)) => (old_path, new_path),
            _ => return -EFAULT,
        };
        if self.fast_check_in_client
            && !(self.renamable(old_path) && self.renamable(new_path))
        {
            return -self.policy.denied_errno();
        }
        let request = Request::Rename { old_path, new_path };
        self.send_request(&request, 0, |reply, _| reply.result)
    }

    /// Copies at most `buf.len()` bytes of the link target, without a
    /// terminating NUL, and returns how many were copied.
    pub fn readlink(&self, pathname: Option<&CStr>, buf: &mut [u8]) -> c_int {
        let path = match pathname {
            Some(path) => path,
            None => return -EFAULT,
        };
        if self.fast_check_in_client && self.policy.file_name_if_allowed_to_open(path, O_RDONLY).is_none() {
            return -self.policy.denied_errno();
        }
        self.send_request(&Request::Readlink { path }, 0, |reply, _| {
            if reply.result < 0 {
                return reply.result;
            }
            let target = reply.payload.unwrap_or_default();
            let copied = usize::min(target.len(), buf.len());
            buf[..copied].copy_from_slice(&target[..copied]);
            copied as c_int
        })
    }

    fn renamable(&self, path: &CStr) -> bool {
        matches!(
            self.policy.file_name_if_allowed_to_open(path, O_RDWR),
            Some((_, false))
        )
    }

    // Serializes `request`, waits for the reply and hands it to `on_reply`.
    // Failing to talk to the broker reads as -ENOMEM, a value every wrapped
    // syscall may legitimately return.
    fn send_request<F>(&self, request: &Request, recv_flags: c_int, on_reply: F) -> c_int
    where
        F: FnOnce(Reply<'_>, Option<Handle>) -> c_int,
    {
        let mut message = Message::new();
        if let Err(e) = request.write_to(&mut message) {
            return match e {
                IpcError::MessageTooLong { .. } => -ENAMETOOLONG,
                _ => -ENOMEM,
            };
        }
        let (reply_message, handle) =
            match send_recv_message(self.ipc_channel.as_raw_fd(), recv_flags, &message) {
                Ok(reply) => reply,
                Err(e) => {
                    raw_log!(self.quiet_failures, "Unable to send {} request to broker: {:?}", request, e);
                    return -ENOMEM;
                }
            };
        let reply = match Reply::read_from(&reply_message, request.command()) {
            Ok(reply) => reply,
            Err(e) => {
                raw_log!(self.quiet_failures, "Invalid reply from broker to {} request: {:?}", request, e);
                return -ENOMEM;
            }
        };
        on_reply(reply, handle)
    }

    fn copy_stat_reply<T: Copy>(&self, reply: &Reply, sb: &mut T) -> c_int {
        if reply.result < 0 {
            return reply.result;
        }
        match reply.payload {
            Some(bytes) if bytes.len() == std::mem::size_of::<T>() => {
                // T is a plain C structure, and the host filled these bytes
                // from the same structure on the same machine.
                unsafe {
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), sb as *mut T as *mut u8, bytes.len());
                }
                reply.result
            }
            _ => {
                raw_log!(self.quiet_failures, "Broker sent a stat buffer of unexpected size");
                -ENOMEM
            }
        }
    }
}
