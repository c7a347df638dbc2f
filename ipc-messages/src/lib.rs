#![cfg(target_os = "linux")]

//! Broker protocol definition. Both ends must be built from the same version
//! of this crate: there is no version negotiation on the wire.

mod reply;
mod request;

pub use reply::Reply;
pub use request::Request;

use sysbroker_ipc::IpcError;

/// Command identifiers, first integer of every request. Zero is never valid,
/// so that a zeroed buffer cannot be mistaken for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Command {
    Open = 1,
    Access = 2,
    Stat = 3,
    Stat64 = 4,
    Rename = 5,
    Readlink = 6,
}

impl TryFrom<i32> for Command {
    type Error = ProtocolError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::Open),
            2 => Ok(Self::Access),
            3 => Ok(Self::Stat),
            4 => Ok(Self::Stat64),
            5 => Ok(Self::Rename),
            6 => Ok(Self::Readlink),
            other => Err(ProtocolError::UnknownCommand { raw: other }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    Ipc(IpcError),
    UnknownCommand { raw: i32 },
    MalformedPath,
    MalformedArgument { argument_name: &'static str },
}

impl From<IpcError> for ProtocolError {
    fn from(e: IpcError) -> Self {
        Self::Ipc(e)
    }
}
