// Diagnostics from the sandboxed process. This may run in a signal handler,
// where the `log` facade (and its allocations, and its locks) cannot be used:
// format into the stack and write(2) to stderr directly.
macro_rules! raw_log {
    ($quiet:expr, $($arg:tt)*) => {{
        if !$quiet {
            use core::fmt::Write;
            let mut buf = ::sysbroker_ipc::StackBuffer::<256>::new();
            let _ = write!(&mut buf, "[sysbroker] ");
            let _ = write!(&mut buf, $($arg)*);
            buf.write_line_to(libc::STDERR_FILENO);
        }
    }};
}
