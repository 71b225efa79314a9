use std::io;

use crate::log::dev_warn;

use super::{consts::*, set::SignalAction, signal_name, SignalNumber};

/// A handler for a signal.
///
/// When a value of this type is dropped, it will try to restore the action that was registered for
/// the signal prior to calling [`SignalHandler::register`].
pub(crate) struct SignalHandler {
    signal: SignalNumber,
    original_action: SignalAction,
}

impl SignalHandler {
    const FORBIDDEN: &'static [SignalNumber] = &[SIGKILL, SIGSTOP];

    /// Register a new handler for the given signal with the provided behavior.
    pub(crate) fn register(
        signal: SignalNumber,
        behavior: SignalHandlerBehavior,
    ) -> io::Result<Self> {
        if Self::FORBIDDEN.contains(&signal) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "the {} signal action cannot be overriden",
                    signal_name(signal).unwrap_or("?")
                ),
            ));
        }

        let action = SignalAction::new(behavior)?;
        let original_action = action.register(signal)?;

        Ok(Self {
            signal,
            original_action,
        })
    }

    pub(crate) fn signal(&self) -> SignalNumber {
        self.signal
    }

    /// `true` if the signal was ignored before this handler was registered.
    pub(crate) fn was_ignored(&self) -> bool {
        self.original_action.is_ignore()
    }
}

impl Drop for SignalHandler {
    #[track_caller]
    fn drop(&mut self) {
        let signal = self.signal;
        if let Err(err) = self.original_action.register(signal) {
            dev_warn!(
                "cannot restore original action for {}: {err}",
                signal_name(signal).unwrap_or("?"),
            )
        }
    }
}

/// The possible behaviors for a [`SignalHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalHandlerBehavior {
    /// Execute the default action for the signal.
    Default,
    /// Ignore the arrival of the signal.
    Ignore,
    /// Latch the signal and stream its information into [`super::SignalStream`]. Interrupted
    /// system calls are restarted.
    Stream,
    /// Like [`SignalHandlerBehavior::Stream`], but blocking system calls fail with `EINTR`.
    Interrupt,
}
