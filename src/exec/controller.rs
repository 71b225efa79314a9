use std::{
    fs::File,
    io::{self, Read, Write},
    os::fd::OwnedFd,
    thread::{self, JoinHandle},
};

use crate::ast::{JobKind, Pipeline};
use crate::builtins::{self, BuiltinFn};
use crate::common::{Environment, Error};
use crate::defaults::Settings;
use crate::jobs::{write_job_line, BackgroundJob, JobId, JobStatus, JobTable};
use crate::log::{dev_debug, dev_info, dev_warn, user_error};
use crate::system::{
    getpgrp,
    interface::ProcessId,
    killpg, pipe,
    signal::{consts::*, SignalNumber, SignalSet},
    term::Terminal,
};

use super::{
    launch, launcher::open_redirections, CommandVector, CriticalSection, ExecutionJob,
    ForkSpawner, LaunchError, SignalCoordinator, Spawner,
};

/// At most this many bytes of captured output are kept.
const CAPTURE_LIMIT: usize = 64 * 1024;

/// How control came back to the shell after running a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Exited(i32),
    /// The job was stopped by the given signal.
    Stopped(JobId, SignalNumber),
    Background(JobId),
}

impl Completion {
    /// The value `$?` takes.
    pub fn status(&self) -> i32 {
        match self {
            Completion::Exited(code) => *code,
            Completion::Stopped(_, signal) => 128 + signal,
            Completion::Background(_) => 0,
        }
    }
}

/// The execution core of the shell: environment, settings, job table and signal handling.
pub struct Shell {
    settings: Settings,
    env: Environment,
    jobs: JobTable,
    signals: Option<SignalCoordinator>,
    spawner: Box<dyn Spawner>,
    shell_pgid: ProcessId,
    /// A foreground job was interrupted and the caller has not been told yet.
    interrupted: bool,
}

impl Shell {
    pub fn new(settings: Settings, env: Environment) -> Self {
        Self {
            jobs: JobTable::new(settings.max_jobs),
            settings,
            env,
            signals: None,
            spawner: Box::new(ForkSpawner),
            shell_pgid: getpgrp(),
            interrupted: false,
        }
    }

    /// Take over signal handling. Without this the default dispositions stay in place.
    pub fn install_signals(&mut self, interactive: bool) -> Result<(), Error> {
        self.signals = Some(SignalCoordinator::install(interactive)?);
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn jobs_mut(&mut self) -> &mut JobTable {
        &mut self.jobs
    }

    /// Expand and run one pipeline.
    pub fn run(&mut self, pipeline: &Pipeline) -> Result<Completion, Error> {
        let commands = CommandVector::build(pipeline, &self.env)?;
        self.execute(ExecutionJob::new(commands, pipeline.kind()))
    }

    /// Run an already expanded job.
    ///
    /// A single command naming a builtin runs inside the shell. Anything else is launched as a
    /// new process group; foreground and pipeline jobs are waited for, background jobs are not.
    pub fn execute(&mut self, job: ExecutionJob) -> Result<Completion, Error> {
        if let [stage] = job.commands().stages() {
            if let Some(builtin) = builtins::find(stage.program()) {
                return self.run_builtin(builtin, job);
            }
        }

        let kind = job.kind();
        let take_terminal = kind == JobKind::Foreground && self.owns_terminal();

        let launched = launch(
            job,
            &mut self.jobs,
            &self.env,
            &self.settings,
            self.spawner.as_mut(),
            take_terminal,
        );
        let id = match launched {
            Ok(id) => id,
            Err(err) => {
                // the first stage may already have taken the terminal before it was killed
                if take_terminal {
                    self.reclaim_terminal();
                }
                return Err(err.into());
            }
        };

        match kind {
            JobKind::Background => {
                self.env.set_last_status(0);
                Ok(Completion::Background(id))
            }
            JobKind::Foreground | JobKind::Pipeline => {
                if take_terminal {
                    self.give_terminal(id);
                }
                self.wait_in_foreground(id, take_terminal)
            }
        }
    }

    fn run_builtin(&mut self, builtin: BuiltinFn, job: ExecutionJob) -> Result<Completion, Error> {
        let (commands, _, output) = job.into_parts();
        let [stage] = commands.stages() else {
            return Err(LaunchError::EmptyPipeline.into());
        };
        let (_, redirected) = open_redirections(stage)?;

        let result = match redirected.or(output) {
            Some(fd) => builtin(self, &stage.argv, &mut File::from(fd)),
            None => builtin(self, &stage.argv, &mut io::stdout()),
        };

        let status = result.unwrap_or_else(|err| {
            user_error!("{}: {err}", stage.program());
            1
        });
        self.env.set_last_status(status);

        Ok(Completion::Exited(status))
    }

    /// Run a pipeline and collect its standard output instead of showing it.
    pub fn capture(&mut self, pipeline: &Pipeline) -> Result<(String, Completion), Error> {
        let commands = CommandVector::build(pipeline, &self.env)?;
        let (rx, tx) = pipe().map_err(LaunchError::Pipe)?;

        let reader = spawn_quiet(move || read_capped(rx));
        // the write end is closed once every stage has its copy
        let completion = self.execute(ExecutionJob::new(commands, JobKind::Pipeline).with_output(tx));

        let output = reader
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output reader panicked"))
            .and_then(|output| output)
            .map_err(|err| Error::io_context("cannot capture output", err))?;

        Ok((output, completion?))
    }

    /// Continue a stopped or running job, either in the foreground or in the background.
    pub fn resume(&mut self, id: JobId, foreground: bool) -> Result<Completion, Error> {
        let job = self.jobs.find_job_by_id(id).ok_or(Error::NoSuchJob(id))?;

        if let JobStatus::Done(code) = job.status() {
            if foreground {
                self.jobs.remove(id);
                self.env.set_last_status(code);
                return Ok(Completion::Exited(code));
            }
            return Ok(Completion::Background(id));
        }

        let take_terminal = foreground && self.owns_terminal();
        if take_terminal {
            self.give_terminal(id);
        }

        if let Err(err) = killpg(job.pgid(), SIGCONT) {
            if take_terminal {
                self.reclaim_terminal();
            }
            return Err(Error::io_context(format!("cannot continue job {id}"), err));
        }
        self.jobs.mark_continued(id);
        dev_info!("continued job {id}");

        if foreground {
            self.wait_in_foreground(id, take_terminal)
        } else {
            Ok(Completion::Background(id))
        }
    }

    fn wait_in_foreground(&mut self, id: JobId, has_terminal: bool) -> Result<Completion, Error> {
        let settled = loop {
            let signals = &self.signals;
            let latched = || signals.as_ref().is_some_and(SignalCoordinator::interrupted);

            match self.jobs.wait_until_settled(id, latched) {
                Ok(status) => break status,
                Err(Error::Interrupted) => {
                    // kept for `take_interrupted`, the latch itself is cleared
                    if self.signals.as_ref().is_some_and(SignalCoordinator::take_interrupted) {
                        self.interrupted = true;
                        self.forward_interrupt(id);
                    }
                }
                Err(err) => {
                    if has_terminal {
                        self.reclaim_terminal();
                    }
                    return Err(err);
                }
            }
        };

        if has_terminal {
            self.reclaim_terminal();
        }

        match settled {
            JobStatus::Done(code) => {
                self.jobs.remove(id);
                if code == 128 + SIGINT {
                    self.interrupted = true;
                }
                self.env.set_last_status(code);
                Ok(Completion::Exited(code))
            }
            JobStatus::Stopped => {
                let signal = self
                    .jobs
                    .find_job_by_id(id)
                    .as_ref()
                    .and_then(BackgroundJob::stop_signal)
                    .unwrap_or(SIGTSTP);
                let completion = Completion::Stopped(id, signal);
                self.env.set_last_status(completion.status());
                Ok(completion)
            }
            JobStatus::Running => Ok(Completion::Background(id)),
        }
    }

    fn forward_interrupt(&self, id: JobId) {
        if let Some(job) = self.jobs.find_job_by_id(id) {
            dev_debug!("interrupted, terminating job {id}");
            if let Err(err) = killpg(job.pgid(), SIGTERM) {
                dev_warn!("cannot terminate job {id}: {err}");
            }
        }
    }

    /// The terminal is only handed around if job control is on and it is ours to give.
    fn owns_terminal(&self) -> bool {
        let stdin = io::stdin();
        self.settings.job_control
            && stdin.is_terminal_device()
            && stdin
                .tcgetpgrp()
                .is_ok_and(|pgrp| pgrp == self.shell_pgid)
    }

    fn give_terminal(&self, id: JobId) {
        let Some(job) = self.jobs.find_job_by_id(id) else {
            return;
        };
        if let Err(err) = io::stdin().tcsetpgrp(job.pgid()) {
            dev_warn!("cannot give the terminal to job {id}: {err}");
        }
    }

    fn reclaim_terminal(&self) {
        // we are a background group right now
        let original = SignalSet::from_signals(&[SIGTTOU]).and_then(|set| set.block());

        if let Err(err) = io::stdin().tcsetpgrp(self.shell_pgid) {
            dev_warn!("cannot reclaim the terminal: {err}");
        }

        match original {
            Ok(set) => {
                if let Err(err) = set.set_mask() {
                    dev_warn!("cannot restore signal mask: {err}");
                }
            }
            Err(err) => dev_warn!("cannot block SIGTTOU: {err}"),
        }
    }

    /// Collect pending child state changes and discard queued signal records.
    pub fn drain_signals(&mut self) -> usize {
        if let Some(signals) = &self.signals {
            signals.drain();
        }
        self.jobs.reap()
    }

    /// Report every finished job once and forget it.
    pub fn notify_finished(&mut self, out: &mut dyn Write) -> io::Result<usize> {
        self.drain_signals();

        let finished = self.jobs.finished();
        for &id in &finished {
            if let Some(job) = self.jobs.remove(id) {
                if self.settings.notify {
                    write_job_line(out, &job, false)?;
                }
            }
        }

        Ok(finished.len())
    }

    /// Whether a terminate or hangup request arrived.
    pub fn should_exit(&self) -> bool {
        self.signals
            .as_ref()
            .is_some_and(|signals| signals.should_terminate() || signals.should_hangup())
    }

    pub fn hangup_received(&self) -> bool {
        self.signals
            .as_ref()
            .is_some_and(SignalCoordinator::should_hangup)
    }

    /// Whether the user interrupted since the last call: either `SIGINT` reached the shell, or
    /// a foreground job was killed by it.
    pub fn take_interrupted(&mut self) -> bool {
        let latched = self
            .signals
            .as_ref()
            .is_some_and(SignalCoordinator::take_interrupted);
        std::mem::take(&mut self.interrupted) || latched
    }

    /// Send `SIGHUP` to every unfinished job, and `SIGCONT` to the stopped ones so they see it.
    pub fn hangup_jobs(&mut self) {
        self.jobs.for_each_job(|job| {
            let status = job.status();
            if status.is_done() {
                return;
            }
            if let Err(err) = killpg(job.pgid(), SIGHUP) {
                dev_warn!("cannot hang up job {}: {err}", job.id());
            }
            if status == JobStatus::Stopped {
                killpg(job.pgid(), SIGCONT).ok();
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn set_spawner(&mut self, spawner: Box<dyn Spawner>) {
        self.spawner = spawner;
    }
}

/// Start a helper thread that never handles `SIGCHLD` or `SIGINT`; those are left to the main
/// thread, whose blocking waits they are meant to cut short.
fn spawn_quiet<T: Send + 'static>(work: impl FnOnce() -> T + Send + 'static) -> JoinHandle<T> {
    // a new thread starts with the signal mask of its creator
    let _guard = CriticalSection::enter();
    thread::spawn(work)
}

fn read_capped(fd: OwnedFd) -> io::Result<String> {
    let mut file = File::from(fd);
    let mut kept = Vec::new();
    let mut buf = [0; 4096];

    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let room = CAPTURE_LIMIT.saturating_sub(kept.len());
        // keep draining past the limit so the writer never blocks
        kept.extend_from_slice(&buf[..read.min(room)]);
    }

    Ok(String::from_utf8_lossy(&kept).into_owned())
}
