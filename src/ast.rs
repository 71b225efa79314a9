//! The syntax tree handed over by a command-line parser.
//!
//! Words are kept exactly as written, quotes included; giving them meaning is the job of
//! [`crate::expand`].
#![forbid(unsafe_code)]
use std::{fmt, os::fd::RawFd};

/// A raw word, possibly containing quoting, glob or parameter syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word(String);

impl Word {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Word {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Word {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `< target`
    Input,
    /// `> target`
    Output,
    /// `>> target`
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Path(Word),
    /// An already open descriptor of the shell, `<&N` / `>&N`.
    Fd(RawFd),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: RedirectTarget,
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.kind {
            RedirectKind::Input => "<",
            RedirectKind::Output => ">",
            RedirectKind::Append => ">>",
        };
        match &self.target {
            RedirectTarget::Path(word) => write!(f, "{op} {word}"),
            RedirectTarget::Fd(fd) => write!(f, "{op}&{fd}"),
        }
    }
}

/// One command of a pipeline: its words and redirections in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleCommand {
    pub words: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

impl SimpleCommand {
    pub fn new<W: Into<Word>>(words: impl IntoIterator<Item = W>) -> Self {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            redirects: Vec::new(),
        }
    }

    pub fn redirect(mut self, kind: RedirectKind, target: RedirectTarget) -> Self {
        self.redirects.push(Redirect { kind, target });
        self
    }
}

impl fmt::Display for SimpleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for item in self
            .words
            .iter()
            .map(|w| w as &dyn fmt::Display)
            .chain(self.redirects.iter().map(|r| r as &dyn fmt::Display))
        {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

/// How the shell treats a job once its processes are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// The shell hands the terminal over and waits until the job finishes or stops.
    Foreground,
    /// The shell reports the job id and returns immediately.
    Background,
    /// The shell waits like for a foreground job but keeps the terminal, since the job's output
    /// is consumed by the shell itself.
    Pipeline,
}

/// Commands connected by `|`, optionally terminated by `&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<SimpleCommand>,
    pub background: bool,
}

impl Pipeline {
    pub fn new(commands: Vec<SimpleCommand>) -> Self {
        Self {
            commands,
            background: false,
        }
    }

    pub fn kind(&self) -> JobKind {
        if self.background {
            JobKind::Background
        } else {
            JobKind::Foreground
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{command}")?;
        }
        if self.background {
            f.write_str(" &")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reconstructs_the_command_line() {
        let pipeline = Pipeline {
            commands: vec![
                SimpleCommand::new(["cat", "'a b'"])
                    .redirect(RedirectKind::Input, RedirectTarget::Path("in.txt".into())),
                SimpleCommand::new(["sort"])
                    .redirect(RedirectKind::Append, RedirectTarget::Path("out".into()))
                    .redirect(RedirectKind::Output, RedirectTarget::Fd(2)),
            ],
            background: true,
        };

        assert_eq!(
            pipeline.to_string(),
            "cat 'a b' < in.txt | sort >> out >&2 &"
        );
        assert_eq!(pipeline.kind(), JobKind::Background);
    }

    #[test]
    fn commands_from_owned_words() {
        let script = format!("'exit {}'", 3);
        let command = SimpleCommand::new(["sh".to_string(), "-c".to_string(), script]);
        assert_eq!(command.words[2], Word::from("'exit 3'"));
        assert_eq!(command.to_string(), "sh -c 'exit 3'");
    }
}
