use std::{fmt, io};

use libc::{c_int, WCONTINUED, WNOHANG, WUNTRACED};

use crate::cutils::cerr;
use crate::system::{
    interface::ProcessId,
    signal::{signal_name, SignalNumber},
};

mod sealed {
    pub(crate) trait Sealed {}

    impl Sealed for crate::system::interface::ProcessId {}
    impl Sealed for super::AnyInGroup {}
}

/// Something `waitpid` can be pointed at: one child, or every child in a process group.
pub(crate) trait Wait: sealed::Sealed {
    /// Block until a matching child changes state, subject to `options`.
    fn wait(self, options: WaitOptions) -> Result<(ProcessId, WaitStatus), WaitError>;
}

fn waitpid(target: libc::pid_t, options: WaitOptions) -> Result<(ProcessId, WaitStatus), WaitError> {
    let mut status: c_int = 0;

    let pid =
        cerr(unsafe { libc::waitpid(target, &mut status, options.flags) }).map_err(WaitError::Io)?;

    if pid == 0 {
        // only possible with WNOHANG
        return Err(WaitError::NotReady);
    }

    Ok((ProcessId::new(pid), WaitStatus { status }))
}

impl Wait for ProcessId {
    fn wait(self, options: WaitOptions) -> Result<(ProcessId, WaitStatus), WaitError> {
        waitpid(self.get(), options)
    }
}

/// Any child whose process group ID is the wrapped one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnyInGroup(pub(crate) ProcessId);

impl Wait for AnyInGroup {
    fn wait(self, options: WaitOptions) -> Result<(ProcessId, WaitStatus), WaitError> {
        waitpid(-self.0.get(), options)
    }
}

#[derive(Debug)]
pub enum WaitError {
    /// Nothing to report yet; only with [`WaitOptions::no_hang`].
    NotReady,
    Io(io::Error),
}

impl WaitError {
    /// `true` if there is no child left to wait for.
    pub fn is_no_child(&self) -> bool {
        matches!(self, WaitError::Io(err) if err.raw_os_error() == Some(libc::ECHILD))
    }
}

/// Flags for `waitpid`. Without any, only terminations are reported and the call blocks.
#[derive(Clone, Copy)]
pub struct WaitOptions {
    flags: c_int,
}

impl WaitOptions {
    pub const fn new() -> Self {
        Self { flags: 0 }
    }

    pub const fn no_hang(mut self) -> Self {
        self.flags |= WNOHANG;
        self
    }

    /// Also report children stopped by a signal.
    pub const fn untraced(mut self) -> Self {
        self.flags |= WUNTRACED;
        self
    }

    /// Also report stopped children resumed by `SIGCONT`.
    pub const fn continued(mut self) -> Self {
        self.flags |= WCONTINUED;
        self
    }
}

/// A decoded `wait` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Exited(c_int),
    Killed(SignalNumber),
    Stopped(SignalNumber),
    Continued,
}

/// The raw status word filled in by `waitpid`.
#[derive(Clone, Copy)]
pub struct WaitStatus {
    status: c_int,
}

impl WaitStatus {
    pub fn state(&self) -> Option<ChildState> {
        let status = self.status;
        if libc::WIFEXITED(status) {
            Some(ChildState::Exited(libc::WEXITSTATUS(status)))
        } else if libc::WIFSIGNALED(status) {
            Some(ChildState::Killed(libc::WTERMSIG(status)))
        } else if libc::WIFSTOPPED(status) {
            Some(ChildState::Stopped(libc::WSTOPSIG(status)))
        } else if libc::WIFCONTINUED(status) {
            Some(ChildState::Continued)
        } else {
            None
        }
    }

    /// What `$?` shows for a terminated child: its exit code, or `128 + signal` when killed.
    pub fn shell_status(&self) -> Option<c_int> {
        match self.state()? {
            ChildState::Exited(code) => Some(code),
            ChildState::Killed(signal) => Some(128 + signal),
            ChildState::Stopped(_) | ChildState::Continued => None,
        }
    }

    pub fn was_stopped(&self) -> bool {
        matches!(self.state(), Some(ChildState::Stopped(_)))
    }

    pub fn did_continue(&self) -> bool {
        self.state() == Some(ChildState::Continued)
    }
}

impl fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |signal| signal_name(signal).unwrap_or("?");
        match self.state() {
            Some(ChildState::Exited(code)) => write!(f, "Exited({code})"),
            Some(ChildState::Killed(signal)) => write!(f, "Killed({})", name(signal)),
            Some(ChildState::Stopped(signal)) => write!(f, "Stopped({})", name(signal)),
            Some(ChildState::Continued) => f.write_str("Continued"),
            None => write!(f, "Unknown({:#x})", self.status),
        }
    }
}

// Linux encodings, so the job state machine can be driven without real processes.
#[cfg(test)]
impl WaitStatus {
    pub(crate) const fn exited(code: c_int) -> Self {
        Self {
            status: (code & 0xff) << 8,
        }
    }

    pub(crate) const fn signaled(signal: SignalNumber) -> Self {
        Self {
            status: signal & 0x7f,
        }
    }

    pub(crate) const fn stopped(signal: SignalNumber) -> Self {
        Self {
            status: ((signal & 0xff) << 8) | 0x7f,
        }
    }

    pub(crate) const fn continued() -> Self {
        Self { status: 0xffff }
    }
}
