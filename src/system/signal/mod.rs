//! Utilities to handle signals.
use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
};

mod handler;
mod info;
mod set;
mod stream;

pub(crate) use handler::{SignalHandler, SignalHandlerBehavior};
pub(crate) use info::SignalInfo;
pub(crate) use set::{SignalAction, SignalSet};
pub(crate) use stream::SignalStream;

pub type SignalNumber = libc::c_int;

const MAX_SIGNAL: usize = 64;

// One latch per signal number. Raised by the streaming handler before the signal information is
// written to the stream, so a latch can be observed even if the stream was full.
#[allow(clippy::declare_interior_mutable_const)]
const LOWERED: AtomicBool = AtomicBool::new(false);
static LATCHES: [AtomicBool; MAX_SIGNAL + 1] = [LOWERED; MAX_SIGNAL + 1];

fn latch(signal: SignalNumber) -> Option<&'static AtomicBool> {
    usize::try_from(signal).ok().and_then(|idx| LATCHES.get(idx))
}

/// Raise the latch of `signal`. Async-signal-safe.
pub(crate) fn raise_latch(signal: SignalNumber) {
    if let Some(latch) = latch(signal) {
        latch.store(true, Ordering::SeqCst);
    }
}

/// Return whether `signal` arrived since the latch was last lowered, lowering it.
pub(crate) fn take_latch(signal: SignalNumber) -> bool {
    latch(signal).is_some_and(|latch| latch.swap(false, Ordering::SeqCst))
}

/// Return whether `signal` arrived since the latch was last lowered.
pub(crate) fn peek_latch(signal: SignalNumber) -> bool {
    latch(signal).is_some_and(|latch| latch.load(Ordering::SeqCst))
}

/// Restore the default action of every signal in `signals` and clear the signal mask.
///
/// Only async-signal-safe calls are made, so this can run in a forked child before `exec`.
pub(crate) fn reset_to_default(signals: &[SignalNumber]) -> io::Result<()> {
    let default = SignalAction::new(SignalHandlerBehavior::Default)?;
    for &signal in signals {
        default.register(signal)?;
    }

    SignalSet::empty()?.set_mask()?;

    Ok(())
}

macro_rules! define_consts {
    ($($signal:ident,)*) => {
        pub mod consts {
            pub use libc::{$($signal,)*};
        }

        pub fn signal_name(signal: SignalNumber) -> Option<&'static str> {
            match signal {
                $(consts::$signal => Some(stringify!($signal)),)*
                _ => None,
            }
        }

        fn signal_by_name(name: &str) -> Option<SignalNumber> {
            $(
                if name.eq_ignore_ascii_case(&stringify!($signal)[3..]) {
                    return Some(consts::$signal);
                }
            )*
            None
        }
    };
}

define_consts! {
    SIGHUP,
    SIGINT,
    SIGQUIT,
    SIGILL,
    SIGTRAP,
    SIGABRT,
    SIGFPE,
    SIGKILL,
    SIGSEGV,
    SIGPIPE,
    SIGALRM,
    SIGTERM,
    SIGUSR1,
    SIGUSR2,
    SIGCHLD,
    SIGCONT,
    SIGSTOP,
    SIGTSTP,
    SIGTTIN,
    SIGTTOU,
    SIGWINCH,
    SIGURG,
}

/// Parse a signal given as a name (`TERM`, `SIGTERM`, `term`) or as a number.
pub fn signal_from_str(input: &str) -> Option<SignalNumber> {
    if input.bytes().all(|b| b.is_ascii_digit()) {
        return input
            .parse::<SignalNumber>()
            .ok()
            .filter(|&n| n > 0 && n as usize <= MAX_SIGNAL);
    }

    let name = match input.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("SIG") => &input[3..],
        _ => input,
    };

    signal_by_name(name)
}
