use crate::system::interface::ProcessId;

use super::SignalNumber;

/// Information related to the arrival of a signal.
#[repr(transparent)]
pub(crate) struct SignalInfo {
    info: libc::siginfo_t,
}

impl SignalInfo {
    pub(super) const SIZE: usize = std::mem::size_of::<Self>();

    /// Returns whether the signal was sent by a process rather than raised by the kernel.
    pub(crate) fn is_user_signaled(&self) -> bool {
        // SI_USER and SI_QUEUE are both non-positive; kernel generated codes are positive.
        self.info.si_code <= 0
    }

    /// Gets the PID that sent the signal. For `SIGCHLD` this is the child that changed state.
    pub(crate) fn pid(&self) -> ProcessId {
        unsafe { ProcessId::new(self.info.si_pid()) }
    }

    /// Gets the signal number.
    pub(crate) fn signal(&self) -> SignalNumber {
        self.info.si_signo
    }
}
