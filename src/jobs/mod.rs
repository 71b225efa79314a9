//! Bookkeeping for launched jobs: their processes, their status and the queries builtins use.
#![forbid(unsafe_code)]
use std::{fmt, num::ParseIntError, str::FromStr};

use crate::log::dev_debug;
use crate::system::{
    interface::ProcessId,
    signal::SignalNumber,
    wait::{ChildState, WaitStatus},
};

mod spec;
mod table;

pub use spec::JobSpec;
pub use table::JobTable;

pub(crate) use table::write_job_line;

/// Identifies a job among the currently live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u32);

impl JobId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(JobId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    /// Every process has exited; carries the status of the last stage.
    Done(i32),
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, JobStatus::Done(_))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done(_) => "Done",
        };
        // honor width and alignment for table output
        f.pad(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Running,
    Stopped(SignalNumber),
    Exited(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProcessEntry {
    pid: ProcessId,
    state: ProcessState,
}

/// A launched pipeline, one process per stage, all in one process group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJob {
    id: JobId,
    pgid: ProcessId,
    processes: Vec<ProcessEntry>,
    status: JobStatus,
    cmd_string: String,
}

impl BackgroundJob {
    fn new(id: JobId, pids: &[ProcessId], pgid: ProcessId, cmd_string: String) -> Self {
        Self {
            id,
            pgid,
            processes: pids
                .iter()
                .map(|&pid| ProcessEntry {
                    pid,
                    state: ProcessState::Running,
                })
                .collect(),
            status: JobStatus::Running,
            cmd_string,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn cmd_string(&self) -> &str {
        &self.cmd_string
    }

    pub fn pgid(&self) -> ProcessId {
        self.pgid
    }

    /// Process IDs in pipeline order.
    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.processes.iter().map(|entry| entry.pid)
    }

    pub fn pid_count(&self) -> usize {
        self.processes.len()
    }

    /// The recorded status once the job is done.
    pub fn exit_status(&self) -> Option<i32> {
        match self.status {
            JobStatus::Done(code) => Some(code),
            _ => None,
        }
    }

    /// The signal that stopped the job, as reported for its first stopped process.
    pub fn stop_signal(&self) -> Option<SignalNumber> {
        if self.status != JobStatus::Stopped {
            return None;
        }
        self.processes.iter().find_map(|entry| match entry.state {
            ProcessState::Stopped(signal) => Some(signal),
            _ => None,
        })
    }

    pub(crate) fn owns(&self, pid: ProcessId) -> bool {
        self.processes.iter().any(|entry| entry.pid == pid)
    }

    /// Pids that have not been collected yet.
    pub(crate) fn live_pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.processes
            .iter()
            .filter(|entry| !matches!(entry.state, ProcessState::Exited(_)))
            .map(|entry| entry.pid)
    }

    /// Record a state change of one of the job's processes. Returns `false` if nothing changed.
    pub(crate) fn apply(&mut self, pid: ProcessId, status: WaitStatus) -> bool {
        if self.status.is_done() {
            return false;
        }

        let Some(entry) = self.processes.iter_mut().find(|entry| entry.pid == pid) else {
            return false;
        };

        entry.state = match status.state() {
            Some(ChildState::Stopped(signal)) => ProcessState::Stopped(signal),
            Some(ChildState::Continued) => ProcessState::Running,
            _ => match status.shell_status() {
                Some(code) => ProcessState::Exited(code),
                None => return false,
            },
        };

        let before = self.status;
        self.refresh();
        if before != self.status {
            dev_debug!("job {} is now {:?}", self.id, self.status);
        }
        true
    }

    /// Mark every process as running again after `SIGCONT` was delivered to the group.
    pub(crate) fn mark_continued(&mut self) {
        if self.status.is_done() {
            return;
        }
        for entry in &mut self.processes {
            if let ProcessState::Stopped(_) = entry.state {
                entry.state = ProcessState::Running;
            }
        }
        self.refresh();
    }

    /// Treat a process that can no longer be waited for as exited with status 0.
    pub(crate) fn forget(&mut self, pid: ProcessId) {
        for entry in self.processes.iter_mut().filter(|entry| entry.pid == pid) {
            if !matches!(entry.state, ProcessState::Exited(_)) {
                entry.state = ProcessState::Exited(0);
            }
        }
        self.refresh();
    }

    pub(crate) fn forget_live(&mut self) {
        let live: Vec<_> = self.live_pids().collect();
        for pid in live {
            self.forget(pid);
        }
    }

    fn refresh(&mut self) {
        let last = self.processes.last().map(|entry| entry.state);
        self.status = if self
            .processes
            .iter()
            .all(|entry| matches!(entry.state, ProcessState::Exited(_)))
        {
            match last {
                Some(ProcessState::Exited(code)) => JobStatus::Done(code),
                _ => JobStatus::Done(0),
            }
        } else if self
            .processes
            .iter()
            .any(|entry| matches!(entry.state, ProcessState::Stopped(_)))
        {
            JobStatus::Stopped
        } else {
            JobStatus::Running
        };
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{BackgroundJob, JobId, JobStatus};
    use crate::system::{
        interface::ProcessId,
        signal::consts::{SIGKILL, SIGSTOP, SIGTSTP},
        wait::WaitStatus,
    };

    fn job(pids: &[i32]) -> BackgroundJob {
        let pids: Vec<_> = pids.iter().copied().map(ProcessId::new).collect();
        BackgroundJob::new(JobId::new(1), &pids, pids[0], "a | b".into())
    }

    #[test]
    fn done_needs_every_process() {
        let mut job = job(&[10, 11]);
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.pid_count(), 2);

        assert!(job.apply(ProcessId::new(10), WaitStatus::exited(0)));
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.exit_status(), None);

        assert!(job.apply(ProcessId::new(11), WaitStatus::exited(3)));
        assert_eq!(job.status(), JobStatus::Done(3));
        assert_eq!(job.exit_status(), Some(3));
    }

    #[test]
    fn last_stage_decides_even_if_it_exits_first() {
        let mut job = job(&[10, 11]);
        job.apply(ProcessId::new(11), WaitStatus::signaled(SIGKILL));
        job.apply(ProcessId::new(10), WaitStatus::exited(1));
        assert_eq!(job.status(), JobStatus::Done(128 + SIGKILL));
    }

    #[test]
    fn stop_and_continue() {
        let mut job = job(&[10, 11]);
        job.apply(ProcessId::new(10), WaitStatus::stopped(SIGTSTP));
        assert_eq!(job.status(), JobStatus::Stopped);
        job.apply(ProcessId::new(11), WaitStatus::stopped(SIGTSTP));
        job.apply(ProcessId::new(10), WaitStatus::continued());
        assert_eq!(job.status(), JobStatus::Stopped);
        job.apply(ProcessId::new(11), WaitStatus::continued());
        assert_eq!(job.status(), JobStatus::Running);

        job.apply(ProcessId::new(10), WaitStatus::stopped(SIGTSTP));
        job.mark_continued();
        assert_eq!(job.status(), JobStatus::Running);

        // a stopped job can finish directly
        job.apply(ProcessId::new(10), WaitStatus::stopped(SIGTSTP));
        job.apply(ProcessId::new(10), WaitStatus::signaled(SIGKILL));
        job.apply(ProcessId::new(11), WaitStatus::exited(0));
        assert_eq!(job.status(), JobStatus::Done(0));
    }

    #[test]
    fn stop_signal_is_kept() {
        let mut job = job(&[10, 11]);
        assert_eq!(job.stop_signal(), None);

        job.apply(ProcessId::new(11), WaitStatus::stopped(SIGSTOP));
        assert_eq!(job.stop_signal(), Some(SIGSTOP));
        job.apply(ProcessId::new(10), WaitStatus::stopped(SIGTSTP));
        assert_eq!(job.stop_signal(), Some(SIGTSTP));

        job.mark_continued();
        assert_eq!(job.stop_signal(), None);
    }

    #[test]
    fn done_is_terminal() {
        let mut job = job(&[10]);
        job.apply(ProcessId::new(10), WaitStatus::exited(4));
        assert!(!job.apply(ProcessId::new(10), WaitStatus::continued()));
        job.mark_continued();
        assert_eq!(job.status(), JobStatus::Done(4));
    }

    #[test]
    fn unknown_pid_is_ignored() {
        let mut job = job(&[10]);
        assert!(!job.apply(ProcessId::new(99), WaitStatus::exited(1)));
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn forgotten_processes_count_as_success() {
        let mut job = job(&[10, 11]);
        job.apply(ProcessId::new(11), WaitStatus::exited(2));
        job.forget_live();
        assert_eq!(job.status(), JobStatus::Done(2));
    }

    #[test]
    fn status_display_pads() {
        assert_eq!(format!("[{:<9}]", JobStatus::Stopped), "[Stopped  ]");
        assert_eq!(JobStatus::Done(1).to_string(), "Done");
    }
}
