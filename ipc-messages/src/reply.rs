use crate::{Command, ProtocolError};
use sysbroker_ipc::{IpcError, Message};

/// Reply to a request: `INT(result)`, 0 or more on success and `-errno` on
/// failure. Successful Stat, Stat64 and Readlink replies are followed by
/// `DATA(payload)` (raw stat structure, or link target). File descriptors are
/// never part of the payload, they travel as ancillary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<'a> {
    pub result: i32,
    pub payload: Option<&'a [u8]>,
}

impl<'a> Reply<'a> {
    pub fn code(result: i32) -> Self {
        Self {
            result,
            payload: None,
        }
    }

    pub fn with_payload(result: i32, payload: &'a [u8]) -> Self {
        Self {
            result,
            payload: Some(payload),
        }
    }

    pub fn write_to(&self, msg: &mut Message) -> Result<(), IpcError> {
        msg.add_int(self.result)?;
        if let Some(payload) = self.payload {
            msg.add_data(payload)?;
        }
        Ok(())
    }

    pub fn read_from(msg: &'a Message, command: Command) -> Result<Self, ProtocolError> {
        let result = msg.read_int()?;
        let has_payload = matches!(
            command,
            Command::Stat | Command::Stat64 | Command::Readlink
        ) && result >= 0;
        let payload = if has_payload {
            Some(msg.read_data()?)
        } else {
            None
        };
        Ok(Self { result, payload })
    }
}
