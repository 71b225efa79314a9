use std::fmt;
use std::io::Write;

#[cfg(feature = "dev")]
use std::{fs::File, path::Path};

use super::{Level, Log};

/// Writes records as single lines to anything that can be written through a shared reference.
pub struct SimpleLogger<W: Send + Sync>
where
    for<'a> &'a W: Write,
{
    target: W,
    prefix: &'static str,
}

impl<W: Send + Sync> SimpleLogger<W>
where
    for<'a> &'a W: Write,
{
    /// A prefixed sink faces the user and only shows errors, warnings and notices.
    fn shows(&self, level: Level) -> bool {
        self.prefix.is_empty() || level <= Level::Info
    }
}

impl<W: Send + Sync> Log for SimpleLogger<W>
where
    for<'a> &'a W: Write,
{
    fn log(&self, level: Level, args: &fmt::Arguments<'_>) {
        if self.shows(level) {
            let _ = writeln!(&self.target, "{}{}", self.prefix, args);
        }
    }

    fn flush(&self) {
        let _ = (&self.target).flush();
    }
}

impl SimpleLogger<std::io::Stderr> {
    pub fn to_stderr(prefix: &'static str) -> Self {
        SimpleLogger {
            target: std::io::stderr(),
            prefix,
        }
    }
}

#[cfg(feature = "dev")]
impl SimpleLogger<File> {
    pub fn to_file(path: impl AsRef<Path>, prefix: &'static str) -> std::io::Result<Self> {
        let target = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self { target, prefix })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::{Level, Log, SimpleLogger};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for &'_ Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capturing(prefix: &'static str) -> (SimpleLogger<Captured>, Captured) {
        let captured = Captured::default();
        let logger = SimpleLogger {
            target: captured.clone(),
            prefix,
        };
        (logger, captured)
    }

    #[test]
    fn one_line_per_record() {
        let (logger, captured) = capturing("jobsh: ");
        logger.log(Level::Error, &format_args!("no such job: {}", 4));
        logger.log(Level::Warn, &format_args!("second"));
        assert_eq!(captured.text(), "jobsh: no such job: 4\njobsh: second\n");
    }

    #[test]
    fn user_facing_sink_drops_debug_records() {
        let (logger, captured) = capturing("jobsh: ");
        logger.log(Level::Debug, &format_args!("reaped 1234"));
        assert_eq!(captured.text(), "");

        let (logger, captured) = capturing("");
        logger.log(Level::Debug, &format_args!("reaped 1234"));
        assert_eq!(captured.text(), "reaped 1234\n");
    }
}
