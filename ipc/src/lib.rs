#![cfg(target_os = "linux")]

//! Wire layer of the syscall broker: a flat, allocation-free message codec
//! and the SOCK_SEQPACKET primitives carrying messages and file descriptors
//! between a sandboxed client and its broker.

mod channel;
mod error;
mod handle;
mod message;
mod stackbuffer;

pub use channel::{recv_message, send_message, send_recv_message, IpcChannel};
pub use error::IpcError;
pub use handle::{downcast_to_handle, Handle};
pub use message::{EntryType, Message, MAX_MESSAGE_LENGTH};
pub use stackbuffer::StackBuffer;

pub fn errno() -> libc::c_int {
    unsafe { *(libc::__errno_location()) }
}
