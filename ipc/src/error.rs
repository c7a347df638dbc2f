use crate::message::EntryType;

// Everything in here must stay allocation-free: these errors are produced
// and consumed from signal handlers in sandboxed processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    InvalidHandleValue {
        raw_value: i64,
    },
    MessageTooLong {
        current_length: usize,
        entry_length: usize,
    },
    WrongMessageDirection,
    UnexpectedEntryType {
        expected: EntryType,
        found: u32,
    },
    TruncatedEntry {
        offset: usize,
    },
    PayloadTruncated,
    AncillaryDataTruncated,
    UnexpectedAncillaryData {
        clevel: i32,
        ctype: i32,
    },
    TooManyHandlesReceived,
    IncompleteSend {
        sent: usize,
        expected: usize,
    },
    PeerClosed,
    InternalOsOperationFailed {
        description: &'static str,
        os_code: i32,
    },
}

impl IpcError {
    /// OS error code behind this error, if it comes from a failed system call.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::InternalOsOperationFailed { os_code, .. } => Some(*os_code),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidHandleValue { .. } => "invalid file descriptor value",
            Self::MessageTooLong { .. } => "entry does not fit in message",
            Self::WrongMessageDirection => "message already used in the other direction",
            Self::UnexpectedEntryType { .. } => "unexpected message entry type",
            Self::TruncatedEntry { .. } => "truncated message entry",
            Self::PayloadTruncated => "received message was truncated",
            Self::AncillaryDataTruncated => "received ancillary data was truncated",
            Self::UnexpectedAncillaryData { .. } => "unexpected ancillary data level or type",
            Self::TooManyHandlesReceived => "more than one file descriptor received",
            Self::IncompleteSend { .. } => "message only partially sent",
            Self::PeerClosed => "peer closed the channel",
            Self::InternalOsOperationFailed { description, .. } => description,
        }
    }
}
