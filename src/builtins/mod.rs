//! Job control commands that run inside the shell process.
#![forbid(unsafe_code)]
use std::io::Write;

use crate::common::{set_env_var, Error};
use crate::exec::{Completion, Shell};
use crate::jobs::{JobId, JobSpec, JobStatus};
use crate::system::{
    interface::ProcessId,
    kill, killpg,
    signal::{consts::SIGTERM, signal_from_str, SignalNumber},
};

pub(crate) type BuiltinFn = fn(&mut Shell, &[String], &mut dyn Write) -> Result<i32, Error>;

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("bg", bg),
    ("export", export),
    ("fg", fg),
    ("jobs", jobs),
    ("kill", kill_builtin),
    ("ps", ps),
    ("wait", wait),
];

pub(crate) fn find(name: &str) -> Option<BuiltinFn> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|&(_, function)| function)
}

pub fn is_builtin(name: &str) -> bool {
    find(name).is_some()
}

fn resolve(shell: &Shell, spec: Option<&String>) -> Result<JobId, Error> {
    spec.map_or(Ok(JobSpec::Current), |spec| spec.parse())?
        .resolve(shell.jobs())
}

fn jobs(shell: &mut Shell, args: &[String], out: &mut dyn Write) -> Result<i32, Error> {
    let long = match &args[1..] {
        [] => false,
        [flag] if flag == "-l" => true,
        _ => return Err(Error::Options("usage: jobs [-l]".into())),
    };

    shell.drain_signals();
    shell.jobs().print_jobs(out, long)?;
    Ok(0)
}

fn ps(shell: &mut Shell, _args: &[String], out: &mut dyn Write) -> Result<i32, Error> {
    shell.drain_signals();

    let mut result = writeln!(out, "   PID  JOB   STATUS      COMMAND");
    shell.jobs().for_each_job(|job| {
        for pid in job.pids() {
            if result.is_ok() {
                result = writeln!(
                    out,
                    "{:>6}  [{}]  {:<10}  {}",
                    pid.get(),
                    job.id(),
                    job.status(),
                    job.cmd_string()
                );
            }
        }
    });
    result?;

    Ok(0)
}

fn wait(shell: &mut Shell, args: &[String], _out: &mut dyn Write) -> Result<i32, Error> {
    match &args[1..] {
        [] => {
            let mut ids = Vec::new();
            shell.jobs().for_each_job(|job| ids.push(job.id()));
            let mut status = 0;
            for id in ids {
                status = shell.jobs_mut().wait_for_job(id)?;
            }
            Ok(status)
        }
        [spec] => {
            let id = resolve(shell, Some(spec))?;
            shell.jobs_mut().wait_for_job(id)
        }
        _ => Err(Error::Options("usage: wait [JOB]".into())),
    }
}

enum KillTarget {
    Job(JobId),
    Process(ProcessId),
}

fn parse_kill_args(shell: &Shell, args: &[String]) -> Result<(SignalNumber, KillTarget), Error> {
    let parse_signal =
        |name: &str| signal_from_str(name).ok_or_else(|| Error::InvalidSignal(name.to_string()));

    let (signal, target) = match args {
        [flag, name, target] if flag == "-s" => (parse_signal(name)?, target),
        [flag, target] if flag.starts_with('-') && flag.len() > 1 => {
            (parse_signal(&flag[1..])?, target)
        }
        [target] => (SIGTERM, target),
        _ => return Err(Error::Options("usage: kill [-s SIGNAL | -SIGNAL] JOB|PID".into())),
    };

    let target = if target.starts_with('%') {
        KillTarget::Job(resolve(shell, Some(target))?)
    } else {
        let pid = target
            .parse::<ProcessId>()
            .ok()
            .filter(|pid| pid.get() > 0)
            .ok_or_else(|| Error::InvalidJobSpec(target.to_string()))?;
        KillTarget::Process(pid)
    };

    Ok((signal, target))
}

fn kill_builtin(shell: &mut Shell, args: &[String], _out: &mut dyn Write) -> Result<i32, Error> {
    let (signal, target) = parse_kill_args(shell, &args[1..])?;

    match target {
        KillTarget::Job(id) => {
            let job = shell.jobs().find_job_by_id(id).ok_or(Error::NoSuchJob(id))?;
            killpg(job.pgid(), signal)
                .map_err(|err| Error::io_context(format!("%{id}"), err))?;
        }
        KillTarget::Process(pid) => {
            kill(pid, signal).map_err(|err| Error::io_context(pid.to_string(), err))?;
        }
    }

    Ok(0)
}

fn fg(shell: &mut Shell, args: &[String], out: &mut dyn Write) -> Result<i32, Error> {
    let id = match &args[1..] {
        [] => resolve(shell, None)?,
        [spec] => resolve(shell, Some(spec))?,
        _ => return Err(Error::Options("usage: fg [JOB]".into())),
    };

    if let Some(job) = shell.jobs().find_job_by_id(id) {
        writeln!(out, "{}", job.cmd_string())?;
    }

    let completion = shell.resume(id, true)?;
    if let Completion::Stopped(id, _) = completion {
        if let Some(job) = shell.jobs().find_job_by_id(id) {
            writeln!(out, "[{id}]+  {:<23} {}", JobStatus::Stopped, job.cmd_string())?;
        }
    }

    Ok(completion.status())
}

fn bg(shell: &mut Shell, args: &[String], out: &mut dyn Write) -> Result<i32, Error> {
    let ids = match &args[1..] {
        [] => vec![resolve(shell, None)?],
        specs => specs
            .iter()
            .map(|spec| resolve(shell, Some(spec)))
            .collect::<Result<Vec<_>, _>>()?,
    };

    for id in ids {
        shell.resume(id, false)?;
        if let Some(job) = shell.jobs().find_job_by_id(id) {
            writeln!(out, "[{id}]  {} &", job.cmd_string())?;
        }
    }

    Ok(0)
}

fn export(shell: &mut Shell, args: &[String], _out: &mut dyn Write) -> Result<i32, Error> {
    if args.len() < 2 {
        return Err(Error::Options("usage: export NAME=VALUE...".into()));
    }

    for assignment in &args[1..] {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| Error::InvalidName(assignment.clone()))?;
        set_env_var(shell.env_mut(), name, value)?;
    }

    Ok(0)
}
