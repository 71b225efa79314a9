use crate::{cutils::cerr, system::make_zeroed_sigaction};

use super::{handler::SignalHandlerBehavior, SignalNumber};

use std::{io, mem::MaybeUninit};

#[repr(transparent)]
pub(crate) struct SignalAction {
    raw: libc::sigaction,
}

impl SignalAction {
    pub(crate) fn new(behavior: SignalHandlerBehavior) -> io::Result<Self> {
        let (sa_sigaction, sa_mask, sa_flags) = match behavior {
            SignalHandlerBehavior::Default => (libc::SIG_DFL, SignalSet::empty()?, 0),
            SignalHandlerBehavior::Ignore => (libc::SIG_IGN, SignalSet::empty()?, 0),
            // Nothing else may interrupt `send_siginfo`, hence the full mask.
            SignalHandlerBehavior::Stream => (
                super::stream::send_siginfo as libc::sighandler_t,
                SignalSet::full()?,
                libc::SA_SIGINFO | libc::SA_RESTART,
            ),
            // Without `SA_RESTART` a blocking `waitpid` or `read` fails with `EINTR`.
            SignalHandlerBehavior::Interrupt => (
                super::stream::send_siginfo as libc::sighandler_t,
                SignalSet::full()?,
                libc::SA_SIGINFO,
            ),
        };

        let mut raw: libc::sigaction = make_zeroed_sigaction();
        raw.sa_sigaction = sa_sigaction;
        raw.sa_mask = sa_mask.raw;
        raw.sa_flags = sa_flags;

        Ok(Self { raw })
    }

    pub(crate) fn register(&self, signal: SignalNumber) -> io::Result<Self> {
        let mut original_action = MaybeUninit::<Self>::zeroed();

        cerr(unsafe { libc::sigaction(signal, &self.raw, original_action.as_mut_ptr().cast()) })?;

        Ok(unsafe { original_action.assume_init() })
    }

    /// `true` if this action ignores the signal.
    pub(crate) fn is_ignore(&self) -> bool {
        self.raw.sa_sigaction == libc::SIG_IGN
    }
}

// A signal set that can be used to mask signals.
#[repr(transparent)]
pub(crate) struct SignalSet {
    raw: libc::sigset_t,
}

impl SignalSet {
    /// Create an empty set.
    pub(crate) fn empty() -> io::Result<Self> {
        let mut set = MaybeUninit::<Self>::zeroed();

        cerr(unsafe { libc::sigemptyset(set.as_mut_ptr().cast()) })?;

        Ok(unsafe { set.assume_init() })
    }

    /// Create a set containing all the signals.
    pub(crate) fn full() -> io::Result<Self> {
        let mut set = MaybeUninit::<Self>::zeroed();

        cerr(unsafe { libc::sigfillset(set.as_mut_ptr().cast()) })?;

        Ok(unsafe { set.assume_init() })
    }

    /// Create a set containing exactly the given signals.
    pub(crate) fn from_signals(signals: &[SignalNumber]) -> io::Result<Self> {
        let mut set = Self::empty()?;
        for &signal in signals {
            set.add(signal)?;
        }
        Ok(set)
    }

    /// Add a signal to this set.
    pub(crate) fn add(&mut self, signal: SignalNumber) -> io::Result<()> {
        cerr(unsafe { libc::sigaddset(&mut self.raw, signal) }).map(|_| ())
    }

    /// Return whether `signal` is a member of this set.
    pub(crate) fn contains(&self, signal: SignalNumber) -> bool {
        unsafe { libc::sigismember(&self.raw, signal) == 1 }
    }

    fn sigprocmask(&self, how: libc::c_int) -> io::Result<Self> {
        let mut original_set = MaybeUninit::<Self>::zeroed();

        // The mask is per thread on every platform we run on; `pthread_sigmask` says so explicitly.
        let errno =
            unsafe { libc::pthread_sigmask(how, &self.raw, original_set.as_mut_ptr().cast()) };
        if errno != 0 {
            return Err(io::Error::from_raw_os_error(errno));
        }

        Ok(unsafe { original_set.assume_init() })
    }

    /// Block all the signals in this set and return the previous set of blocked signals.
    ///
    /// After calling this function successfully, the set of blocked signals will be the union of
    /// the previous set of blocked signals and this set.
    pub(crate) fn block(&self) -> io::Result<Self> {
        self.sigprocmask(libc::SIG_BLOCK)
    }

    /// Block only the signals that are in this set and return the previous set of blocked signals.
    ///
    /// After calling this function successfully, the set of blocked signals will be the exactly
    /// this set.
    pub(crate) fn set_mask(&self) -> io::Result<Self> {
        self.sigprocmask(libc::SIG_SETMASK)
    }
}

#[cfg(test)]
mod tests {
    use super::SignalSet;
    use crate::system::signal::consts::*;

    #[test]
    fn membership() {
        let set = SignalSet::from_signals(&[SIGCHLD, SIGINT]).unwrap();
        assert!(set.contains(SIGCHLD));
        assert!(set.contains(SIGINT));
        assert!(!set.contains(SIGTERM));
        assert!(!SignalSet::empty().unwrap().contains(SIGCHLD));
        assert!(SignalSet::full().unwrap().contains(SIGTERM));
    }

    #[test]
    fn block_then_restore() {
        let blocked = SignalSet::from_signals(&[SIGUSR1]).unwrap();
        let original = blocked.block().unwrap();
        assert!(!original.contains(SIGUSR1));

        let during = original.set_mask().unwrap();
        assert!(during.contains(SIGUSR1));

        let after = SignalSet::empty().unwrap().block().unwrap();
        assert!(!after.contains(SIGUSR1));
    }
}
