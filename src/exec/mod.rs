//! Turning expanded pipelines into running process groups and following them to completion.
#![deny(unsafe_code)]

mod builder;
mod controller;
mod job;
mod launcher;
mod signal_manager;

use std::{fmt, io};

pub use builder::{CommandStage, CommandVector, Target};
pub use controller::{Completion, Shell};
pub use job::ExecutionJob;
pub use signal_manager::{CriticalSection, SignalCoordinator};

pub(crate) use launcher::{launch, ChildSetup, ForkSpawner, Spawner};

/// Why a job could not be started. No process of the job is left running when this is returned.
#[derive(Debug)]
pub enum LaunchError {
    EmptyPipeline,
    TooManyStages { stages: usize, limit: usize },
    TableFull(usize),
    Redirect { path: String, source: io::Error },
    Pipe(io::Error),
    Spawn { stage: usize, source: io::Error },
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::EmptyPipeline => f.write_str("empty pipeline"),
            LaunchError::TooManyStages { stages, limit } => {
                write!(f, "pipeline has {stages} commands, at most {limit} are allowed")
            }
            LaunchError::TableFull(limit) => write!(f, "too many jobs (limit is {limit})"),
            LaunchError::Redirect { path, source } => write!(f, "{path}: {source}"),
            LaunchError::Pipe(e) => write!(f, "cannot create pipe: {e}"),
            LaunchError::Spawn { stage, source } => {
                write!(f, "cannot start command {}: {source}", stage + 1)
            }
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::Redirect { source, .. } | LaunchError::Spawn { source, .. } => Some(source),
            LaunchError::Pipe(source) => Some(source),
            _ => None,
        }
    }
}
