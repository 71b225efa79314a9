#![forbid(unsafe_code)]
use std::{
    fs::File,
    io::{self, Write},
    os::fd::AsFd,
};

use crate::ast::Pipeline;
use crate::cli::{help, parse_line, JobshAction, JobshOptions};
use crate::common::{Environment, Error};
use crate::defaults::Settings;
use crate::exec::{Completion, LaunchError, Shell};
use crate::jobs::JobStatus;
use crate::log::{dev_info, user_error};
use crate::system::term::Terminal;

mod reader;

use reader::LineReader;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PROMPT: &str = "jobsh$ ";

/// Status of a line that could not be run at all.
fn error_status(err: &Error) -> i32 {
    match err {
        Error::Launch(LaunchError::Spawn { .. }) => 126,
        _ => 1,
    }
}

fn report(shell: &Shell, pipeline: &Pipeline, completion: Completion, interactive: bool) {
    let Some(job) = (match completion {
        Completion::Exited(_) => None,
        Completion::Stopped(id, _) | Completion::Background(id) => shell.jobs().find_job_by_id(id),
    }) else {
        return;
    };

    match completion {
        Completion::Background(id) if interactive => {
            if let Some(pid) = job.pids().last() {
                eprintln_ignore_io_error!("[{id}] {pid}");
            }
        }
        Completion::Stopped(id, _) => {
            eprintln_ignore_io_error!("\n[{id}]+  {:<23} {}", JobStatus::Stopped, pipeline);
        }
        _ => {}
    }
}

/// Run every pipeline of one input line. Returns the status of the last one.
fn run_line(shell: &mut Shell, line: &str, interactive: bool) -> i32 {
    let pipelines = match parse_line(line) {
        Ok(pipelines) => pipelines,
        Err(message) => {
            user_error!("{message}");
            shell.env_mut().set_last_status(2);
            return 2;
        }
    };

    for pipeline in &pipelines {
        match shell.run(pipeline) {
            Ok(completion) => report(shell, pipeline, completion, interactive),
            Err(err) => {
                user_error!("{err}");
                shell.env_mut().set_last_status(error_status(&err));
            }
        }

        // ^C abandons the rest of the line
        if shell.take_interrupted() || shell.should_exit() {
            dev_info!("abandoning the rest of the line");
            break;
        }
    }

    shell.env().last_status()
}

fn repl(shell: &mut Shell, interactive: bool) -> Result<i32, Error> {
    let stdin = io::stdin().as_fd().try_clone_to_owned()?;
    let mut reader = LineReader::new(File::from(stdin));

    loop {
        // scripts only collect finished jobs, they do not report them
        if interactive {
            shell.notify_finished(&mut io::stdout())?;
        } else {
            shell.notify_finished(&mut io::sink())?;
        }
        if shell.should_exit() {
            break;
        }

        if interactive {
            let mut stderr = io::stderr();
            write!(stderr, "{PROMPT}")?;
            stderr.flush()?;
        }

        match reader.read_line() {
            Ok(Some(line)) => {
                run_line(shell, &line, interactive);
            }
            Ok(None) => {
                if interactive {
                    eprintln_ignore_io_error!();
                }
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                shell.take_interrupted();
                if interactive {
                    eprintln_ignore_io_error!();
                }
            }
            Err(err) => return Err(Error::io_context("cannot read input", err)),
        }
    }

    Ok(shell.env().last_status())
}

fn jobsh_process() -> Result<i32, Error> {
    crate::log::ShellLogger::new("jobsh: ").into_global_logger();

    dev_info!("development logs are enabled");

    let options = match JobshOptions::from_env() {
        Ok(options) => options,
        Err(message) => {
            user_error!("{message}");
            eprintln_ignore_io_error!("{}", help::USAGE_MSG);
            std::process::exit(2);
        }
    };

    match options.action {
        JobshAction::Help => {
            println_ignore_io_error!("{}", help::long_help_message());
            return Ok(0);
        }
        JobshAction::Version => {
            println_ignore_io_error!("jobsh {VERSION}");
            return Ok(0);
        }
        JobshAction::Run => {}
    }

    let mut settings = Settings::default();
    for assignment in &options.settings {
        settings.apply(assignment)?;
    }

    let interactive =
        options.interactive || (options.command.is_none() && io::stdin().is_terminal_device());

    let mut shell = Shell::new(settings, Environment::from_process());
    shell.install_signals(interactive)?;

    let status = match options.command {
        Some(line) => run_line(&mut shell, &line, interactive),
        None => repl(&mut shell, interactive)?,
    };

    if shell.hangup_received() {
        shell.hangup_jobs();
    }

    Ok(status)
}

pub fn main() {
    match jobsh_process() {
        Ok(status) => std::process::exit(status),
        Err(error) => {
            user_error!("{error}");
            std::process::exit(1);
        }
    }
}
