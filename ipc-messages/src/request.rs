use crate::{Command, ProtocolError};
use libc::c_int;
use std::ffi::CStr;
use sysbroker_ipc::{IpcError, Message};

/// A request from a sandboxed client. Paths borrow from the message they
/// were decoded from, or from the caller when encoding.
///
/// Layouts:
/// - Open, Access: `INT(command) DATA(path) INT(flags or mode)`
/// - Stat, Stat64: `INT(command) DATA(path) INT(follow_links)`
/// - Rename:       `INT(command) DATA(old_path) DATA(new_path)`
/// - Readlink:     `INT(command) DATA(path)`
///
/// Paths are sent with their terminating NUL byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Open { path: &'a CStr, flags: c_int },
    Access { path: &'a CStr, mode: c_int },
    Stat { path: &'a CStr, follow_links: bool },
    Stat64 { path: &'a CStr, follow_links: bool },
    Rename { old_path: &'a CStr, new_path: &'a CStr },
    Readlink { path: &'a CStr },
}

impl<'a> Request<'a> {
    pub fn command(&self) -> Command {
        match self {
            Self::Open { .. } => Command::Open,
            Self::Access { .. } => Command::Access,
            Self::Stat { .. } => Command::Stat,
            Self::Stat64 { .. } => Command::Stat64,
            Self::Rename { .. } => Command::Rename,
            Self::Readlink { .. } => Command::Readlink,
        }
    }

    pub fn write_to(&self, msg: &mut Message) -> Result<(), IpcError> {
        msg.add_int(self.command() as i32)?;
        match *self {
            Self::Open { path, flags } => {
                msg.add_data(path.to_bytes_with_nul())?;
                msg.add_int(flags)
            }
            Self::Access { path, mode } => {
                msg.add_data(path.to_bytes_with_nul())?;
                msg.add_int(mode)
            }
            Self::Stat { path, follow_links } | Self::Stat64 { path, follow_links } => {
                msg.add_data(path.to_bytes_with_nul())?;
                msg.add_int(follow_links.into())
            }
            Self::Rename { old_path, new_path } => {
                msg.add_data(old_path.to_bytes_with_nul())?;
                msg.add_data(new_path.to_bytes_with_nul())
            }
            Self::Readlink { path } => msg.add_data(path.to_bytes_with_nul()),
        }
    }

    pub fn read_from(msg: &'a Message) -> Result<Self, ProtocolError> {
        let command = Command::try_from(msg.read_int()?)?;
        let path = read_path(msg)?;
        let req = match command {
            Command::Open => Self::Open {
                path,
                flags: msg.read_int()?,
            },
            Command::Access => Self::Access {
                path,
                mode: msg.read_int()?,
            },
            Command::Stat => Self::Stat {
                path,
                follow_links: read_bool(msg, "follow_links")?,
            },
            Command::Stat64 => Self::Stat64 {
                path,
                follow_links: read_bool(msg, "follow_links")?,
            },
            Command::Rename => Self::Rename {
                old_path: path,
                new_path: read_path(msg)?,
            },
            Command::Readlink => Self::Readlink { path },
        };
        Ok(req)
    }
}

fn read_path(msg: &Message) -> Result<&CStr, ProtocolError> {
    let bytes = msg.read_data()?;
    // Exactly one NUL, at the very end
    CStr::from_bytes_with_nul(bytes).map_err(|_| ProtocolError::MalformedPath)
}

fn read_bool(msg: &Message, argument_name: &'static str) -> Result<bool, ProtocolError> {
    match msg.read_int()? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ProtocolError::MalformedArgument { argument_name }),
    }
}

impl core::fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Open { path, flags } => write!(f, "open({:?}, {:#X})", path, flags),
            Self::Access { path, mode } => write!(f, "access({:?}, {:#o})", path, mode),
            Self::Stat { path, follow_links } => write!(f, "stat({:?}, follow_links={})", path, follow_links),
            Self::Stat64 { path, follow_links } => write!(f, "stat64({:?}, follow_links={})", path, follow_links),
            Self::Rename { old_path, new_path } => write!(f, "rename({:?}, {:?})", old_path, new_path),
            Self::Readlink { path } => write!(f, "readlink({:?})", path),
        }
    }
}
