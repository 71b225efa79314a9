use std::{collections::BTreeMap, io};

use crate::common::Error;
use crate::exec::CriticalSection;
use crate::log::{dev_debug, dev_info, dev_warn};
use crate::system::{
    interface::ProcessId,
    wait::{AnyInGroup, Wait, WaitError, WaitOptions, WaitStatus},
};

use super::{BackgroundJob, JobId, JobStatus};

/// Every job the shell launched and has not forgotten yet, ordered by id.
///
/// Status changes are collected by [`JobTable::reap`] and by the blocking waits; all of them run
/// on the main thread with `SIGCHLD` and `SIGINT` blocked while a record is touched.
#[derive(Debug)]
pub struct JobTable {
    jobs: BTreeMap<JobId, BackgroundJob>,
    capacity: usize,
}

impl JobTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: BTreeMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.get_job_count() >= self.capacity
    }

    /// Register a job whose processes have all been spawned. Returns `None` when the table is
    /// full.
    ///
    /// The new id is one more than the highest live id.
    pub fn add(
        &mut self,
        pids: &[ProcessId],
        pgid: ProcessId,
        cmd_string: impl Into<String>,
    ) -> Option<JobId> {
        let _guard = CriticalSection::enter();

        if self.jobs.len() >= self.capacity {
            return None;
        }

        let id = JobId::new(self.jobs.keys().next_back().map_or(1, |id| id.get() + 1));
        let job = BackgroundJob::new(id, pids, pgid, cmd_string.into());
        dev_info!("registered job {id} with process group {pgid}");
        self.jobs.insert(id, job);

        Some(id)
    }

    pub fn remove(&mut self, id: JobId) -> Option<BackgroundJob> {
        let _guard = CriticalSection::enter();
        self.jobs.remove(&id)
    }

    /// A snapshot of the job with the given id.
    pub fn find_job_by_id(&self, id: JobId) -> Option<BackgroundJob> {
        let _guard = CriticalSection::enter();
        self.jobs.get(&id).cloned()
    }

    pub fn find_job_by_pid(&self, pid: ProcessId) -> Option<JobId> {
        let _guard = CriticalSection::enter();
        self.jobs
            .values()
            .find(|job| job.owns(pid))
            .map(BackgroundJob::id)
    }

    pub fn get_job_count(&self) -> usize {
        let _guard = CriticalSection::enter();
        self.jobs.len()
    }

    /// Call `callback` for every job in id order, with signals held off for the whole walk.
    pub fn for_each_job(&self, mut callback: impl FnMut(&BackgroundJob)) {
        let _guard = CriticalSection::enter();
        for job in self.jobs.values() {
            callback(job);
        }
    }

    /// The job `%%` refers to: the one launched last.
    pub fn most_recent(&self) -> Option<JobId> {
        self.jobs.keys().next_back().copied()
    }

    /// Ids of the jobs that are done, in id order.
    pub fn finished(&self) -> Vec<JobId> {
        let _guard = CriticalSection::enter();
        self.jobs
            .values()
            .filter(|job| job.status().is_done())
            .map(BackgroundJob::id)
            .collect()
    }

    /// Collect pending state changes of every registered process without blocking. Returns the
    /// number of changes recorded.
    ///
    /// Only pids that belong to a job are waited for, so children the shell does not track are
    /// never collected here.
    pub fn reap(&mut self) -> usize {
        let _guard = CriticalSection::enter();
        let options = WaitOptions::new().no_hang().untraced().continued();
        let mut changes = 0;

        for job in self.jobs.values_mut() {
            let pids: Vec<_> = job.live_pids().collect();
            for pid in pids {
                match pid.wait(options) {
                    Ok((pid, status)) => {
                        dev_debug!("reaped {pid}: {status:?}");
                        if job.apply(pid, status) {
                            changes += 1;
                        }
                    }
                    Err(WaitError::NotReady) => {}
                    Err(err) if err.is_no_child() => {
                        dev_warn!("process {pid} of job {} vanished", job.id());
                        job.forget(pid);
                        changes += 1;
                    }
                    Err(WaitError::Io(err)) => dev_warn!("cannot wait for {pid}: {err}"),
                }
            }
        }

        changes
    }

    /// Record a state change reported for `pid`. Returns `false` if no live job owns it.
    pub(crate) fn apply(&mut self, pid: ProcessId, status: WaitStatus) -> bool {
        let _guard = CriticalSection::enter();
        self.jobs
            .values_mut()
            .find(|job| job.owns(pid))
            .is_some_and(|job| job.apply(pid, status))
    }

    pub(crate) fn mark_continued(&mut self, id: JobId) {
        let _guard = CriticalSection::enter();
        if let Some(job) = self.jobs.get_mut(&id) {
            job.mark_continued();
        }
    }

    /// Block until the job is done and return the status of its last stage.
    ///
    /// A job that is already done returns its recorded status right away, as often as asked. The
    /// job stays in the table.
    pub fn wait_for_job(&mut self, id: JobId) -> Result<i32, Error> {
        loop {
            let status = self.status_of(id)?;
            if let JobStatus::Done(code) = status {
                return Ok(code);
            }
            self.wait_step(id)?;
        }
    }

    /// Block until the job is no longer running, that is done or stopped.
    ///
    /// `interrupted` is asked before every blocking wait. Once it answers `true` the wait ends
    /// with [`Error::Interrupted`], as it does when a signal cuts the wait itself short.
    pub(crate) fn wait_until_settled(
        &mut self,
        id: JobId,
        mut interrupted: impl FnMut() -> bool,
    ) -> Result<JobStatus, Error> {
        loop {
            let status = self.status_of(id)?;
            if status != JobStatus::Running {
                return Ok(status);
            }
            if interrupted() {
                return Err(Error::Interrupted);
            }
            self.wait_step(id)?;
        }
    }

    fn status_of(&self, id: JobId) -> Result<JobStatus, Error> {
        let _guard = CriticalSection::enter();
        self.jobs
            .get(&id)
            .map(BackgroundJob::status)
            .ok_or(Error::NoSuchJob(id))
    }

    // Wait for one state change of any process of the job.
    fn wait_step(&mut self, id: JobId) -> Result<(), Error> {
        let options = WaitOptions::new().untraced().continued();
        let job = self.jobs.get(&id).ok_or(Error::NoSuchJob(id))?;

        let (target, result) = match AnyInGroup(job.pgid()).wait(options) {
            // a process may have moved to another group
            Err(err) if err.is_no_child() => match job.live_pids().next() {
                Some(pid) => (Some(pid), pid.wait(options)),
                None => (None, Err(err)),
            },
            result => (None, result),
        };

        match result {
            Ok((pid, status)) => {
                dev_debug!("job {id}: {pid} changed to {status:?}");
                self.apply(pid, status);
                Ok(())
            }
            Err(WaitError::NotReady) => Ok(()),
            Err(err) if err.is_no_child() => {
                dev_warn!("job {id} has processes that cannot be waited for");
                let _guard = CriticalSection::enter();
                if let Some(job) = self.jobs.get_mut(&id) {
                    match target {
                        Some(pid) => job.forget(pid),
                        None => job.forget_live(),
                    }
                }
                Ok(())
            }
            Err(WaitError::Io(err)) if err.kind() == io::ErrorKind::Interrupted => {
                Err(Error::Interrupted)
            }
            Err(WaitError::Io(err)) => Err(Error::io_context(format!("cannot wait for job {id}"), err)),
        }
    }

    /// Print one line per job: `[N]  Status  command`. The long form adds the process IDs.
    pub fn print_jobs(&self, out: &mut dyn io::Write, long: bool) -> io::Result<()> {
        let _guard = CriticalSection::enter();
        for job in self.jobs.values() {
            write_job_line(out, job, long)?;
        }
        Ok(())
    }
}

pub(crate) fn write_job_line(
    out: &mut dyn io::Write,
    job: &BackgroundJob,
    long: bool,
) -> io::Result<()> {
    write!(out, "[{}]  {:<23} {}", job.id(), job.status(), job.cmd_string())?;
    if long {
        let pids: Vec<_> = job.pids().map(|pid| pid.to_string()).collect();
        write!(out, " ({})", pids.join(" "))?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    use pretty_assertions::assert_eq;

    use super::JobTable;
    use crate::common::Error;
    use crate::jobs::{JobId, JobStatus};
    use crate::system::{
        interface::ProcessId,
        kill,
        signal::consts::{SIGKILL, SIGTSTP},
        wait::WaitStatus,
    };

    fn pids(raw: &[i32]) -> Vec<ProcessId> {
        raw.iter().copied().map(ProcessId::new).collect()
    }

    fn spawn(script: &str) -> ProcessId {
        let child = Command::new("sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        ProcessId::new(child.id() as i32)
    }

    #[test]
    fn ids_follow_the_highest_live_job() {
        let mut table = JobTable::new(10);
        let a = table.add(&pids(&[100]), ProcessId::new(100), "a").unwrap();
        let b = table.add(&pids(&[200]), ProcessId::new(200), "b").unwrap();
        assert_eq!((a, b), (JobId::new(1), JobId::new(2)));

        table.remove(a);
        assert_eq!(
            table.add(&pids(&[300]), ProcessId::new(300), "c"),
            Some(JobId::new(3))
        );
        table.remove(JobId::new(3));
        table.remove(b);
        assert_eq!(
            table.add(&pids(&[400]), ProcessId::new(400), "d"),
            Some(JobId::new(1))
        );
    }

    #[test]
    fn capacity_is_enforced() {
        let mut table = JobTable::new(1);
        assert!(table.add(&pids(&[1]), ProcessId::new(1), "x").is_some());
        assert!(table.is_full());
        assert_eq!(table.add(&pids(&[2]), ProcessId::new(2), "y"), None);
        assert_eq!(table.get_job_count(), 1);
    }

    #[test]
    fn queries() {
        let mut table = JobTable::new(10);
        let id = table
            .add(&pids(&[100, 101]), ProcessId::new(100), "a | b")
            .unwrap();

        assert_eq!(table.find_job_by_pid(ProcessId::new(101)), Some(id));
        assert_eq!(table.find_job_by_pid(ProcessId::new(5)), None);
        assert_eq!(table.most_recent(), Some(id));

        let job = table.find_job_by_id(id).unwrap();
        assert_eq!(job.pid_count(), 2);
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.cmd_string(), "a | b");

        let mut seen = Vec::new();
        table.for_each_job(|job| seen.push(job.id()));
        assert_eq!(seen, [id]);
    }

    #[test]
    fn listing() {
        let mut table = JobTable::new(10);
        let first = table
            .add(&pids(&[100, 101]), ProcessId::new(100), "sleep 5 | cat")
            .unwrap();
        table.add(&pids(&[200]), ProcessId::new(200), "vi").unwrap();
        table.apply(ProcessId::new(200), WaitStatus::stopped(SIGTSTP));
        table.apply(ProcessId::new(100), WaitStatus::exited(0));
        table.apply(ProcessId::new(101), WaitStatus::exited(0));

        let mut out = Vec::new();
        table.print_jobs(&mut out, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[1]  Done                    sleep 5 | cat\n\
             [2]  Stopped                 vi\n"
        );

        let mut out = Vec::new();
        table.print_jobs(&mut out, true).unwrap();
        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("[1]  Done                    sleep 5 | cat (100 101)\n"));

        assert_eq!(table.finished(), [first]);
    }

    #[test]
    fn reaping_real_processes() {
        let mut table = JobTable::new(10);
        let first = spawn("exit 0");
        let last = spawn("exit 3");
        let id = table.add(&[first, last], first, "a | b").unwrap();

        for _ in 0..200 {
            table.reap();
            if table.find_job_by_id(id).unwrap().status().is_done() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert_eq!(
            table.find_job_by_id(id).unwrap().status(),
            JobStatus::Done(3)
        );
        // repeated waits return the recorded status
        assert_eq!(table.wait_for_job(id).unwrap(), 3);
        assert_eq!(table.wait_for_job(id).unwrap(), 3);
        assert_eq!(table.get_job_count(), 1);
    }

    #[test]
    fn blocking_wait() {
        let mut table = JobTable::new(10);
        let pid = spawn("sleep 0.2; exit 7");
        let id = table.add(&[pid], pid, "sleep").unwrap();

        assert_eq!(table.wait_for_job(id).unwrap(), 7);
        assert!(table.wait_for_job(JobId::new(42)).is_err());
    }

    #[test]
    fn reap_leaves_untracked_children_alone() {
        let mut untracked = Command::new("sh").args(["-c", "exit 5"]).spawn().unwrap();
        let mut table = JobTable::new(10);
        let pid = spawn("exit 0");
        let id = table.add(&[pid], pid, "true").unwrap();

        table.wait_for_job(id).unwrap();
        table.reap();

        assert_eq!(untracked.wait().unwrap().code(), Some(5));
    }

    #[test]
    fn settling_checks_for_interrupts_before_blocking() {
        let mut table = JobTable::new(10);
        let pid = spawn("sleep 30");
        let id = table.add(&[pid], pid, "sleep 30").unwrap();

        // would block for the whole sleep if the check came after the wait
        assert!(matches!(
            table.wait_until_settled(id, || true),
            Err(Error::Interrupted)
        ));

        kill(pid, SIGKILL).unwrap();
        let mut asked = 0;
        let settled = table.wait_until_settled(id, || {
            asked += 1;
            false
        });
        assert_eq!(settled.unwrap(), JobStatus::Done(128 + SIGKILL));
        assert!(asked > 0);
    }

    #[test]
    fn counts_agree_around_a_reap() {
        let mut table = JobTable::new(10);
        for code in 0..4 {
            let pid = spawn(&format!("exit {code}"));
            table.add(&[pid], pid, format!("exit {code}")).unwrap();
        }

        let mut finished = 0;
        for _ in 0..200 {
            let before = table.get_job_count();
            let mut listed = 0;
            table.for_each_job(|_| listed += 1);
            table.reap();
            let after = table.get_job_count();

            // reaping changes statuses, never membership
            assert_eq!((before, listed, after), (4, 4, 4));

            finished = table.finished().len();
            if finished == 4 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(finished, 4);

        let mut statuses = Vec::new();
        table.for_each_job(|job| statuses.push(job.status()));
        assert_eq!(statuses, (0..4).map(JobStatus::Done).collect::<Vec<_>>());

        for id in table.finished() {
            table.remove(id);
        }
        assert_eq!(table.get_job_count(), 0);
    }
}
