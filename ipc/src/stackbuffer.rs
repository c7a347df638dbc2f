use libc::c_int;

// Formatting sink for code running in signal handlers: we cannot allocate
// dynamic memory there. Any formatted message needs to fit into a stack
// buffer, the rest is truncated.
pub struct StackBuffer<const SIZE: usize> {
    pub(crate) buf: [u8; SIZE],
    pub(crate) used_bytes: usize,
}

impl<const SIZE: usize> StackBuffer<SIZE> {
    pub fn new() -> Self {
        Self {
            buf: [0u8; SIZE],
            used_bytes: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[0..self.used_bytes]
    }

    /// Raw write(2) of the contents, followed by a newline. Errors are ignored,
    /// there is nowhere left to report them.
    pub fn write_line_to(&self, fd: c_int) {
        let bytes = self.as_bytes();
        unsafe {
            libc::write(fd, bytes.as_ptr() as *const _, bytes.len());
            libc::write(fd, b"\n".as_ptr() as *const _, 1);
        }
    }
}

impl<const SIZE: usize> Default for StackBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> core::fmt::Write for StackBuffer<SIZE> {
    // Never fails: whatever does not fit is dropped, and the last byte is
    // kept for a terminating NUL.
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let available = SIZE.saturating_sub(1).saturating_sub(self.used_bytes);
        let copied = usize::min(available, s.len());
        self.buf[self.used_bytes..self.used_bytes + copied].copy_from_slice(&s.as_bytes()[..copied]);
        self.used_bytes += copied;
        Ok(())
    }
}
