use std::{
    io,
    mem::MaybeUninit,
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::UnixStream,
    },
    sync::OnceLock,
};

use crate::{cutils::cerr, log::dev_error};

use super::{info::SignalInfo, raise_latch, SignalNumber};

static STREAM: OnceLock<SignalStream> = OnceLock::new();

pub(super) unsafe fn send_siginfo(
    signal: SignalNumber,
    info: *const SignalInfo,
    _context: *const libc::c_void,
) {
    raise_latch(signal);

    if let Some(tx) = STREAM.get().map(|stream| stream.tx.as_raw_fd()) {
        unsafe { libc::send(tx, info.cast(), SignalInfo::SIZE, libc::MSG_DONTWAIT) };
    }
}

/// A type able to receive signal information from any [`super::SignalHandler`] with a streaming
/// behavior.
///
/// This is a singleton type. Meaning that there will be only one value of this type during the
/// execution of a program.
pub(crate) struct SignalStream {
    rx: UnixStream,
    tx: UnixStream,
}

impl SignalStream {
    /// Get the [`SignalStream`], creating it on first use.
    pub(crate) fn get_or_init() -> io::Result<&'static Self> {
        if let Some(stream) = STREAM.get() {
            return Ok(stream);
        }

        let (rx, tx) = UnixStream::pair().map_err(|err| {
            dev_error!("cannot create socket pair for `SignalStream`: {err}");
            err
        })?;
        rx.set_nonblocking(true)?;

        // Losing a race here only drops the pair we just created.
        let _ = STREAM.set(Self { rx, tx });

        STREAM
            .get()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "signal stream unavailable"))
    }

    /// Receive the information related to the arrival of a signal, if any arrived.
    pub(crate) fn try_recv(&self) -> io::Result<Option<SignalInfo>> {
        let mut info = MaybeUninit::<SignalInfo>::uninit();
        let fd = self.rx.as_raw_fd();
        let bytes = match cerr(unsafe {
            libc::recv(fd, info.as_mut_ptr().cast(), SignalInfo::SIZE, 0)
        }) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(err) => return Err(err),
        };

        if bytes as usize != SignalInfo::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes when receiving `siginfo_t`",
            ));
        }
        // SAFETY: we can assume `info` is initialized because `recv` wrote enough bytes to fill
        // the value and `siginfo_t` is POD.
        Ok(Some(unsafe { info.assume_init() }))
    }
}

impl AsRawFd for SignalStream {
    fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}
