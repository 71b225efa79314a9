use std::io::{self, Read};

/// Reads input one byte at a time, so nothing past the current line is taken away from the
/// commands that share the shell's standard input.
///
/// Unlike [`std::io::BufRead::read_line`], an interrupted read is reported to the caller; the
/// partial line is thrown away in that case.
pub(super) struct LineReader<R> {
    input: R,
    line: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub(super) fn new(input: R) -> Self {
        Self {
            input,
            line: Vec::new(),
        }
    }

    /// The next line without its newline, or `None` at end of input.
    pub(super) fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) if self.line.is_empty() => return Ok(None),
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => self.line.push(byte[0]),
                Err(err) => {
                    self.line.clear();
                    return Err(err);
                }
            }
        }

        let line = std::mem::take(&mut self.line);
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read};

    use super::LineReader;

    #[test]
    fn splits_lines() {
        let mut reader = LineReader::new(&b"echo a\n\nlast"[..]);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("echo a"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn leaves_the_rest_unread() {
        let mut input = &b"one\ntwo\n"[..];
        let mut reader = LineReader::new(&mut input);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("one"));
        drop(reader);
        assert_eq!(input, b"two\n");
    }

    struct Interrupting(bool);

    impl Read for Interrupting {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 {
                self.0 = false;
                return Err(io::ErrorKind::Interrupted.into());
            }
            buf[0] = b'\n';
            Ok(1)
        }
    }

    #[test]
    fn interruption_is_reported() {
        let mut reader = LineReader::new(Interrupting(true));
        let err = reader.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(reader.read_line().unwrap().as_deref(), Some(""));
    }
}
