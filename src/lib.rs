#[macro_use]
mod macros;
pub mod ast;
pub(crate) mod builtins;
pub(crate) mod cli;
pub mod common;
pub(crate) mod cutils;
pub mod defaults;
pub mod exec;
pub mod expand;
pub mod jobs;
pub(crate) mod log;
mod repl;
pub mod system;

pub use ast::{JobKind, Pipeline, Redirect, RedirectKind, RedirectTarget, SimpleCommand, Word};
pub use builtins::is_builtin;
pub use cli::parse_line;
pub use common::{set_env_var, Environment, Error};
pub use defaults::Settings;
pub use exec::{Completion, CommandStage, CommandVector, ExecutionJob, LaunchError, Shell};
pub use expand::{expand, ExpansionError, ExpansionVector};
pub use jobs::{BackgroundJob, JobId, JobSpec, JobStatus, JobTable};
pub use repl::main;
