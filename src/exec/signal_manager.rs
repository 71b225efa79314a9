use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::Error;
use crate::log::{dev_debug, dev_warn};
use crate::system::signal::{
    consts::*, peek_latch, reset_to_default, signal_name, take_latch, SignalHandler,
    SignalHandlerBehavior, SignalNumber, SignalSet, SignalStream,
};

/// Signals whose disposition the shell changes, and so must be put back in every child.
pub(crate) const CHILD_RESET_SIGNALS: &[SignalNumber] = &[
    SIGINT, SIGTERM, SIGHUP, SIGCHLD, SIGPIPE, SIGTSTP, SIGTTIN, SIGTTOU, SIGQUIT,
];

macro_rules! define_signals {
    ($name:ident { $($signal:ident => $behavior:ident,)* }) => {
        const $name: &[(SignalNumber, SignalHandlerBehavior)] = &[
            $(($signal, SignalHandlerBehavior::$behavior),)*
        ];
    };
}

/// Termination signals a non-interactive shell leaves ignored if they were ignored when it started.
const KEEP_IF_IGNORED: &[SignalNumber] = &[SIGINT, SIGTERM, SIGHUP];

/// Bit `n` is set if signal `n` was ignored on entry and is kept that way, children included.
static INHERITED_IGNORES: AtomicU64 = AtomicU64::new(0);

define_signals! {
    ALWAYS {
        // no SA_RESTART, so a blocking wait returns when the user interrupts it
        SIGINT => Interrupt,
        SIGTERM => Stream,
        SIGHUP => Stream,
        SIGCHLD => Stream,
        SIGPIPE => Ignore,
    }
}

define_signals! {
    INTERACTIVE {
        SIGTSTP => Ignore,
        SIGTTIN => Ignore,
        SIGTTOU => Ignore,
        SIGQUIT => Ignore,
    }
}

/// Owns the shell's signal dispositions for as long as it lives.
///
/// Handlers only raise a per-signal flag and forward the signal information to the
/// [`SignalStream`]; everything else, reaping included, happens in ordinary control flow. Dropping
/// the coordinator restores every disposition it changed.
pub struct SignalCoordinator {
    handlers: Vec<SignalHandler>,
    stream: &'static SignalStream,
}

impl SignalCoordinator {
    pub fn install(interactive: bool) -> Result<Self, Error> {
        let stream = SignalStream::get_or_init()
            .map_err(|err| Error::io_context("cannot set up signal handling", err))?;

        let table = ALWAYS
            .iter()
            .chain(if interactive { INTERACTIVE } else { &[] });

        let mut handlers = Vec::new();
        for &(signal, behavior) in table {
            let handler = SignalHandler::register(signal, behavior).map_err(|err| {
                Error::io_context(
                    format!(
                        "cannot install handler for {}",
                        signal_name(signal).unwrap_or("?")
                    ),
                    err,
                )
            })?;

            if !interactive && handler.was_ignored() && KEEP_IF_IGNORED.contains(&signal) {
                dev_debug!("{} was ignored on entry", signal_name(signal).unwrap_or("?"));
                INHERITED_IGNORES.fetch_or(1 << signal, Ordering::Relaxed);
                // dropping puts the ignore back
                drop(handler);
                continue;
            }
            handlers.push(handler);
        }

        dev_debug!("installed {} signal handlers", handlers.len());

        Ok(Self { handlers, stream })
    }

    /// Whether an interrupt arrived and was not consumed yet.
    pub fn interrupted(&self) -> bool {
        peek_latch(SIGINT)
    }

    pub fn take_interrupted(&self) -> bool {
        take_latch(SIGINT)
    }

    pub fn should_terminate(&self) -> bool {
        peek_latch(SIGTERM)
    }

    pub fn should_hangup(&self) -> bool {
        peek_latch(SIGHUP)
    }

    /// Discard queued signal records, returning how many were pending.
    ///
    /// The flags above already carry the information the shell acts on.
    pub fn drain(&self) -> usize {
        let mut count = 0;
        loop {
            match self.stream.try_recv() {
                Ok(Some(info)) => {
                    dev_debug!(
                        "received {} from {}",
                        signal_name(info.signal()).unwrap_or("?"),
                        info.pid()
                    );
                    count += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    dev_warn!("cannot read from signal stream: {err}");
                    break;
                }
            }
        }
        count
    }

    #[cfg(test)]
    fn handles(&self, signal: SignalNumber) -> bool {
        self.handlers.iter().any(|handler| handler.signal() == signal)
    }
}

/// Put back the default disposition of every signal the shell touches and unblock all signals.
///
/// Signals ignored since the shell started stay ignored.
pub(crate) fn reset_for_child() -> io::Result<()> {
    let inherited = INHERITED_IGNORES.load(Ordering::Relaxed);
    let mut signals = [0; CHILD_RESET_SIGNALS.len()];
    let mut count = 0;
    for &signal in CHILD_RESET_SIGNALS {
        if inherited & (1 << signal) == 0 {
            signals[count] = signal;
            count += 1;
        }
    }
    reset_to_default(&signals[..count])
}

/// Blocks `SIGCHLD` and `SIGINT` until dropped, so a multi-field read or update of shared job
/// state is not split by a handler.
pub struct CriticalSection {
    original: Option<SignalSet>,
}

impl CriticalSection {
    pub fn enter() -> Self {
        let original = match SignalSet::from_signals(&[SIGCHLD, SIGINT]).and_then(|set| set.block())
        {
            Ok(original) => Some(original),
            Err(err) => {
                dev_warn!("cannot block signals: {err}");
                None
            }
        };

        Self { original }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if let Some(set) = self.original.take() {
            if let Err(err) = set.set_mask() {
                dev_warn!("cannot restore signal mask: {err}");
            }
        }
    }
}
