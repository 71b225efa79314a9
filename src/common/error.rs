use std::{fmt, io};

use crate::exec::LaunchError;
use crate::expand::ExpansionError;
use crate::jobs::JobId;

#[derive(Debug)]
pub enum Error {
    Expansion(ExpansionError),
    Launch(LaunchError),
    NoSuchJob(JobId),
    InvalidJobSpec(String),
    InvalidSignal(String),
    InvalidSetting(String),
    InvalidName(String),
    Options(String),
    Interrupted,
    Io(Option<String>, io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Expansion(e) => write!(f, "{e}"),
            Error::Launch(e) => write!(f, "{e}"),
            Error::NoSuchJob(id) => write!(f, "no such job: {id}"),
            Error::InvalidJobSpec(spec) => write!(f, "invalid job specification: {spec}"),
            Error::InvalidSignal(signal) => write!(f, "invalid signal: {signal}"),
            Error::InvalidSetting(setting) => write!(f, "invalid setting: {setting}"),
            Error::InvalidName(name) => write!(f, "'{name}': not a valid identifier"),
            Error::Options(e) => write!(f, "{e}"),
            Error::Interrupted => f.write_str("interrupted"),
            Error::Io(context, e) => {
                if let Some(context) = context {
                    write!(f, "{context}: {e}")
                } else {
                    write!(f, "IO error: {e}")
                }
            }
        }
    }
}

impl From<ExpansionError> for Error {
    fn from(err: ExpansionError) -> Self {
        Error::Expansion(err)
    }
}

impl From<LaunchError> for Error {
    fn from(err: LaunchError) -> Self {
        Error::Launch(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(None, err)
    }
}

impl Error {
    /// Returns `true` if the error is [`Interrupted`].
    ///
    /// [`Interrupted`]: Error::Interrupted
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    pub(crate) fn io_context(context: impl Into<String>, err: io::Error) -> Self {
        Error::Io(Some(context.into()), err)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::jobs::JobId;

    #[test]
    fn user_facing_messages() {
        assert_eq!(Error::NoSuchJob(JobId::new(4)).to_string(), "no such job: 4");
        assert_eq!(
            Error::InvalidName("A=B".into()).to_string(),
            "'A=B': not a valid identifier"
        );
        let err = Error::io_context(
            "cannot open 'x'",
            std::io::Error::from_raw_os_error(libc::ENOENT),
        );
        assert!(err.to_string().starts_with("cannot open 'x': "));
        assert!(Error::Interrupted.is_interrupted());
    }
}
