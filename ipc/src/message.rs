use crate::error::IpcError;
use core::cell::Cell;
use core::mem::size_of;

/// Maximum encoded size of a message, ancillary data excluded. Entries that
/// would make a message reach this size are refused.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

const TAG_SIZE: usize = size_of::<u32>();
const INT_SIZE: usize = size_of::<i32>();

/// Tag written before each entry. Arbitrary values, unlikely to be found in
/// a zeroed or random buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EntryType {
    Data = 0xBDBD_BD80,
    Int = 0xBDBD_BD81,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Unused,
    Writing,
    Reading,
}

/// Flat, positional message: a sequence of tagged integers and byte buffers
/// in a fixed-size buffer. Lives on the stack, never allocates, so it can be
/// used from a signal handler.
///
/// A message is either written or read, never both: the first add_*() or
/// read_*() call dedicates it to one direction. Messages handed out by
/// [`crate::recv_message`] are read-only from the start.
pub struct Message {
    buf: [u8; MAX_MESSAGE_LENGTH],
    length: usize,
    read_offset: Cell<usize>,
    direction: Cell<Direction>,
}

impl Message {
    pub fn new() -> Self {
        Self {
            buf: [0u8; MAX_MESSAGE_LENGTH],
            length: 0,
            read_offset: Cell::new(0),
            direction: Cell::new(Direction::Unused),
        }
    }

    pub(crate) fn received() -> Self {
        let msg = Self::new();
        msg.direction.set(Direction::Reading);
        msg
    }

    /// Encoded contents, as they are sent on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub(crate) fn raw_buffer_mut(&mut self) -> &mut [u8; MAX_MESSAGE_LENGTH] {
        &mut self.buf
    }

    pub(crate) fn set_received_length(&mut self, length: usize) {
        self.length = usize::min(length, MAX_MESSAGE_LENGTH);
    }

    pub fn add_data(&mut self, data: &[u8]) -> Result<(), IpcError> {
        let declared_len = i32::try_from(data.len()).map_err(|_| IpcError::MessageTooLong {
            current_length: self.length,
            entry_length: data.len(),
        })?;
        let entry_length = TAG_SIZE + INT_SIZE + data.len();
        self.reserve(entry_length)?;
        self.push(&(EntryType::Data as u32).to_ne_bytes());
        self.push(&declared_len.to_ne_bytes());
        self.push(data);
        Ok(())
    }

    pub fn add_int(&mut self, value: i32) -> Result<(), IpcError> {
        self.reserve(TAG_SIZE + INT_SIZE)?;
        self.push(&(EntryType::Int as u32).to_ne_bytes());
        self.push(&value.to_ne_bytes());
        Ok(())
    }

    /// Reads the next entry, which must be a byte buffer. On error, the read
    /// position is left untouched.
    pub fn read_data(&self) -> Result<&[u8], IpcError> {
        self.start_reading()?;
        let offset = self.read_offset.get();
        let mut cursor = self.check_tag(offset, EntryType::Data)?;
        let declared_len = self.int_at(cursor)?;
        cursor += INT_SIZE;
        let data_len = match usize::try_from(declared_len) {
            Ok(n) if n <= self.length - cursor => n,
            _ => return Err(IpcError::TruncatedEntry { offset }),
        };
        self.read_offset.set(cursor + data_len);
        Ok(&self.buf[cursor..cursor + data_len])
    }

    /// Reads the next entry, which must be an integer. On error, the read
    /// position is left untouched.
    pub fn read_int(&self) -> Result<i32, IpcError> {
        self.start_reading()?;
        let offset = self.read_offset.get();
        let cursor = self.check_tag(offset, EntryType::Int)?;
        let value = self.int_at(cursor)?;
        self.read_offset.set(cursor + INT_SIZE);
        Ok(value)
    }

    fn reserve(&mut self, entry_length: usize) -> Result<(), IpcError> {
        if self.direction.get() == Direction::Reading {
            return Err(IpcError::WrongMessageDirection);
        }
        self.direction.set(Direction::Writing);
        if self.length + entry_length >= MAX_MESSAGE_LENGTH {
            return Err(IpcError::MessageTooLong {
                current_length: self.length,
                entry_length,
            });
        }
        Ok(())
    }

    // Only called after reserve() succeeded
    fn push(&mut self, bytes: &[u8]) {
        self.buf[self.length..self.length + bytes.len()].copy_from_slice(bytes);
        self.length += bytes.len();
    }

    fn start_reading(&self) -> Result<(), IpcError> {
        if self.direction.get() == Direction::Writing {
            return Err(IpcError::WrongMessageDirection);
        }
        self.direction.set(Direction::Reading);
        Ok(())
    }

    fn check_tag(&self, offset: usize, expected: EntryType) -> Result<usize, IpcError> {
        let found = match self.buf[..self.length].get(offset..offset + TAG_SIZE) {
            Some(bytes) => u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            None => return Err(IpcError::TruncatedEntry { offset }),
        };
        if found != expected as u32 {
            return Err(IpcError::UnexpectedEntryType { expected, found });
        }
        Ok(offset + TAG_SIZE)
    }

    fn int_at(&self, offset: usize) -> Result<i32, IpcError> {
        match self.buf[..self.length].get(offset..offset + INT_SIZE) {
            Some(bytes) => Ok(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            None => Err(IpcError::TruncatedEntry { offset }),
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Message")
            .field("length", &self.length)
            .field("read_offset", &self.read_offset.get())
            .field("direction", &self.direction.get())
            .finish()
    }
}
