use std::{io, os::fd::AsRawFd};

use crate::cutils::{cerr, safe_isatty};

use super::interface::ProcessId;

mod sealed {
    use std::os::fd::AsRawFd;

    pub(crate) trait Sealed {}

    impl<F: AsRawFd> Sealed for F {}
}

pub(crate) trait Terminal: sealed::Sealed {
    fn tcgetpgrp(&self) -> io::Result<ProcessId>;
    fn tcsetpgrp(&self, pgrp: ProcessId) -> io::Result<()>;
    fn is_terminal_device(&self) -> bool;
}

impl<F: AsRawFd> Terminal for F {
    /// Get the foreground process group ID associated with this terminal.
    fn tcgetpgrp(&self) -> io::Result<ProcessId> {
        cerr(unsafe { libc::tcgetpgrp(self.as_raw_fd()) }).map(ProcessId::new)
    }

    /// Set the foreground process group ID associated with this terminal to `pgrp`.
    ///
    /// A caller outside the foreground group gets `SIGTTOU` unless it ignores or blocks it.
    fn tcsetpgrp(&self, pgrp: ProcessId) -> io::Result<()> {
        cerr(unsafe { libc::tcsetpgrp(self.as_raw_fd(), pgrp.get()) }).map(|_| ())
    }

    fn is_terminal_device(&self) -> bool {
        safe_isatty(self.as_raw_fd())
    }
}
