use crate::error::IpcError;
use crate::handle::Handle;
use crate::message::{Message, MAX_MESSAGE_LENGTH};
use crate::errno;
use core::mem::size_of;
use libc::{c_int, c_void};
use std::os::unix::io::{AsRawFd, RawFd};

// These calls are just C arithmetic macros translated into rust, in practice they're safe
const FD_CMSG_SPACE: usize = unsafe { libc::CMSG_SPACE(size_of::<c_int>() as u32) } as usize;
const CREDS_CMSG_SPACE: usize =
    unsafe { libc::CMSG_SPACE(size_of::<libc::ucred>() as u32) } as usize;
// Room for exactly one file descriptor, plus sender credentials if the socket
// has SO_PASSCRED set.
const RECV_CMSG_SPACE: usize = FD_CMSG_SPACE + CREDS_CMSG_SPACE;

// Control buffers are accessed through cmsghdr pointers, keep them aligned.
#[repr(C, align(8))]
struct ControlBuffer<const SIZE: usize>([u8; SIZE]);

/// One end of a connected SOCK_SEQPACKET Unix socket pair.
#[derive(Debug)]
pub struct IpcChannel {
    fd: Handle,
}

impl IpcChannel {
    /// Creates a connected pair of channels. Both ends are close-on-exec.
    pub fn new() -> Result<(Self, Self), IpcError> {
        // Safety: we must not return in the middle of this block. The file
        // descriptors are owned by this block and this block only.
        // If socketpair() fails, no file descriptors are returned, so no
        // resource is leaked.
        let (fd0, fd1) = unsafe {
            let mut socks: [c_int; 2] = [-1, -1];
            let res = libc::socketpair(
                libc::AF_UNIX,
                libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
                0,
                socks.as_mut_ptr(),
            );
            if res < 0 {
                return Err(IpcError::InternalOsOperationFailed {
                    os_code: errno(),
                    description: "socketpair() failed",
                });
            }
            (Handle { val: Some(socks[0]) }, Handle { val: Some(socks[1]) })
        };
        Ok((Self { fd: fd0 }, Self { fd: fd1 }))
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { fd: handle }
    }

    pub fn into_handle(self) -> Handle {
        self.fd
    }

    pub fn as_handle(&self) -> &Handle {
        &self.fd
    }

    pub fn send(&self, message: &Message, handle: Option<&Handle>) -> Result<(), IpcError> {
        send_message(self.fd.as_raw(), message, handle)
    }

    pub fn recv(&self, flags: c_int) -> Result<Option<(Message, Option<Handle>)>, IpcError> {
        recv_message(self.fd.as_raw(), flags)
    }

    pub fn send_recv(
        &self,
        recv_flags: c_int,
        request: &Message,
    ) -> Result<(Message, Option<Handle>), IpcError> {
        send_recv_message(self.fd.as_raw(), recv_flags, request)
    }
}

impl AsRawFd for IpcChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw()
    }
}

/// Sends `message` as a single datagram, with `handle` attached as SCM_RIGHTS
/// ancillary data if provided. Never raises SIGPIPE.
pub fn send_message(fd: c_int, message: &Message, handle: Option<&Handle>) -> Result<(), IpcError> {
    let payload = message.as_bytes();
    let msg_iovec = libc::iovec {
        // mut is not used here, just required because iovec is used by recvmsg too
        iov_base: payload.as_ptr() as *mut c_void,
        iov_len: payload.len(),
    };
    let mut cbuf = ControlBuffer([0u8; FD_CMSG_SPACE]);
    // Safety: msghdr is a plain C struct, all-zeroes is a valid (empty) value
    let mut msg: libc::msghdr = unsafe { core::mem::zeroed() };
    msg.msg_iov = &msg_iovec as *const libc::iovec as *mut libc::iovec;
    msg.msg_iovlen = 1;
    if let Some(handle) = handle {
        msg.msg_control = cbuf.0.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = FD_CMSG_SPACE as _;
        let raw_fd = handle.as_raw();
        // Safety: the control buffer is aligned and large enough for one
        // header and one c_int, CMSG_FIRSTHDR cannot return NULL here.
        unsafe {
            let cmsghdr = libc::CMSG_FIRSTHDR(&msg as *const libc::msghdr);
            (*cmsghdr).cmsg_level = libc::SOL_SOCKET;
            (*cmsghdr).cmsg_type = libc::SCM_RIGHTS;
            (*cmsghdr).cmsg_len = libc::CMSG_LEN(size_of::<c_int>() as u32) as _;
            core::ptr::copy_nonoverlapping(
                &raw_fd as *const c_int as *const u8,
                libc::CMSG_DATA(cmsghdr),
                size_of::<c_int>(),
            );
        }
    }
    let sent = loop {
        // Safety: pointers in the iovec{} and msghdr{} point to buffers which
        // outlive the call
        let res = unsafe { libc::sendmsg(fd, &msg as *const libc::msghdr, libc::MSG_NOSIGNAL) };
        if res >= 0 {
            break res as usize;
        }
        let err = errno();
        if err != libc::EINTR {
            return Err(IpcError::InternalOsOperationFailed {
                os_code: err,
                description: "sendmsg() failed",
            });
        }
    };
    if sent != payload.len() {
        return Err(IpcError::IncompleteSend {
            sent,
            expected: payload.len(),
        });
    }
    Ok(())
}

/// Receives one datagram and the file descriptor attached to it, if any.
/// Returns `Ok(None)` when the peer has closed its end.
pub fn recv_message(
    fd: c_int,
    flags: c_int,
) -> Result<Option<(Message, Option<Handle>)>, IpcError> {
    let mut message = Message::received();
    let msg_iovec = libc::iovec {
        iov_base: message.raw_buffer_mut().as_mut_ptr() as *mut c_void,
        iov_len: MAX_MESSAGE_LENGTH,
    };
    let mut cbuf = ControlBuffer([0u8; RECV_CMSG_SPACE]);
    // Safety: msghdr is a plain C struct, all-zeroes is a valid (empty) value
    let mut msg: libc::msghdr = unsafe { core::mem::zeroed() };
    msg.msg_iov = &msg_iovec as *const libc::iovec as *mut libc::iovec;
    msg.msg_iovlen = 1;
    msg.msg_control = cbuf.0.as_mut_ptr() as *mut c_void;
    msg.msg_controllen = RECV_CMSG_SPACE as _;

    let received = loop {
        // Safety: pointers in the iovec{} and msghdr{} point to buffers of the
        // indicated length which outlive the call
        let res = unsafe { libc::recvmsg(fd, &mut msg as *mut libc::msghdr, flags) };
        if res >= 0 {
            break res as usize;
        }
        let err = errno();
        if err != libc::EINTR {
            // If recvmsg() failed altogether, we can return without leaking a fd
            return Err(IpcError::InternalOsOperationFailed {
                os_code: err,
                description: "recvmsg() failed",
            });
        }
    };

    // Take ownership of every received file descriptor before looking at any
    // error condition, so that all early returns below close them.
    let mut handle: Option<Handle> = None;
    let mut too_many_handles = false;
    let mut unexpected_cmsg = None;
    // Safety: CMSG_* only walk the control buffer within msg_controllen, as
    // set by the kernel. The payload is copied out, not dereferenced, since it
    // may not be aligned.
    unsafe {
        let mut cmsghdr = libc::CMSG_FIRSTHDR(&msg as *const libc::msghdr);
        while !cmsghdr.is_null() {
            let (clevel, ctype) = ((*cmsghdr).cmsg_level, (*cmsghdr).cmsg_type);
            if (clevel, ctype) == (libc::SOL_SOCKET, libc::SCM_RIGHTS) {
                let header_len = libc::CMSG_LEN(0) as usize;
                let payload_len = ((*cmsghdr).cmsg_len as usize).saturating_sub(header_len);
                let data = libc::CMSG_DATA(cmsghdr);
                for i in 0..(payload_len / size_of::<c_int>()) {
                    let mut raw_fd: c_int = -1;
                    core::ptr::copy_nonoverlapping(
                        data.add(i * size_of::<c_int>()),
                        &mut raw_fd as *mut c_int as *mut u8,
                        size_of::<c_int>(),
                    );
                    let received = Handle::from_raw(raw_fd.into()).ok();
                    if handle.is_none() {
                        handle = received;
                    } else {
                        too_many_handles = true;
                        drop(received);
                    }
                }
            } else if (clevel, ctype) != (libc::SOL_SOCKET, libc::SCM_CREDENTIALS) {
                unexpected_cmsg = Some((clevel, ctype));
            }
            cmsghdr = libc::CMSG_NXTHDR(&msg as *const libc::msghdr, cmsghdr);
        }
    }

    if (msg.msg_flags & libc::MSG_TRUNC) != 0 {
        return Err(IpcError::PayloadTruncated);
    }
    if (msg.msg_flags & libc::MSG_CTRUNC) != 0 {
        return Err(IpcError::AncillaryDataTruncated);
    }
    if too_many_handles {
        return Err(IpcError::TooManyHandlesReceived);
    }
    if let Some((clevel, ctype)) = unexpected_cmsg {
        return Err(IpcError::UnexpectedAncillaryData { clevel, ctype });
    }
    if received == 0 {
        return Ok(None);
    }
    message.set_received_length(received);
    Ok(Some((message, handle)))
}

/// Synchronous round trip over `fd`.
///
/// The request does not carry the reply: a fresh socket pair is created, one
/// end travels with the request and is used by the peer to reply, the other
/// is read here. Requests sharing `fd` thus never see each other's replies.
pub fn send_recv_message(
    fd: c_int,
    recv_flags: c_int,
    request: &Message,
) -> Result<(Message, Option<Handle>), IpcError> {
    let (reply_reader, reply_writer) = IpcChannel::new()?;
    send_message(fd, request, Some(reply_writer.as_handle()))?;
    // The peer must hold the only write end from now on, so that we read EOF
    // instead of hanging if it goes away without replying.
    drop(reply_writer);
    match recv_message(reply_reader.as_raw_fd(), recv_flags)? {
        Some(reply) => Ok(reply),
        None => Err(IpcError::PeerClosed),
    }
}
