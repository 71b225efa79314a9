use std::os::fd::OwnedFd;

use crate::ast::JobKind;

use super::CommandVector;

/// A fully expanded pipeline together with how it should run.
///
/// The optional overrides replace the standard input of the first stage and the standard output
/// of the last stage, unless that stage redirects them itself.
#[derive(Debug)]
pub struct ExecutionJob {
    commands: CommandVector,
    kind: JobKind,
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
}

impl ExecutionJob {
    pub fn new(commands: CommandVector, kind: JobKind) -> Self {
        Self {
            commands,
            kind,
            input: None,
            output: None,
        }
    }

    pub fn with_input(mut self, fd: OwnedFd) -> Self {
        self.input = Some(fd);
        self
    }

    pub fn with_output(mut self, fd: OwnedFd) -> Self {
        self.output = Some(fd);
        self
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn commands(&self) -> &CommandVector {
        &self.commands
    }

    pub(crate) fn into_parts(self) -> (CommandVector, Option<OwnedFd>, Option<OwnedFd>) {
        (self.commands, self.input, self.output)
    }
}
