use std::{
    fs::OpenOptions,
    io,
    os::{
        fd::{AsRawFd, OwnedFd, RawFd},
        unix::process::CommandExt,
    },
    process::Command,
};

use crate::common::Environment;
use crate::defaults::Settings;
use crate::jobs::{JobId, JobTable};
use crate::log::{dev_debug, dev_info, dev_warn, user_error};
use crate::system::{
    _exit, dup2, dup_cloexec, fork, getpgrp,
    interface::ProcessId,
    kill, pipe, set_cloexec, setpgid,
    signal::{consts::*, SignalSet},
    term::Terminal,
    wait::{Wait, WaitError, WaitOptions},
    ForkResult,
};

use super::{signal_manager::reset_for_child, CommandStage, ExecutionJob, LaunchError, Target};

/// Everything a child needs to become one stage of a job.
pub(crate) struct ChildSetup<'a> {
    pub(crate) command: &'a mut Command,
    pub(crate) stdin: Option<RawFd>,
    pub(crate) stdout: Option<RawFd>,
    /// The group to join, or `None` to lead a new one.
    pub(crate) pgid: Option<ProcessId>,
    pub(crate) take_terminal: bool,
}

/// Creates the process for one pipeline stage.
pub(crate) trait Spawner {
    fn spawn(&mut self, setup: ChildSetup<'_>) -> io::Result<ProcessId>;
}

/// Spawns stages with `fork` followed by `exec`.
pub(crate) struct ForkSpawner;

impl Spawner for ForkSpawner {
    fn spawn(&mut self, setup: ChildSetup<'_>) -> io::Result<ProcessId> {
        // Keep every handler of the shell from running in the child until the dispositions are
        // reset there.
        let original_set = match SignalSet::full().and_then(|set| set.block()) {
            Ok(original_set) => Some(original_set),
            Err(err) => {
                dev_warn!("cannot block signals: {err}");
                None
            }
        };

        #[allow(unused_unsafe, unsafe_code)]
        let forked = unsafe { fork() };

        let result = match forked {
            Ok(ForkResult::Child) => exec_child(setup),
            Ok(ForkResult::Parent(pid)) => {
                // Also done by the child; whoever comes first wins, the other may fail.
                if let Err(err) = setpgid(pid, setup.pgid.unwrap_or(pid)) {
                    dev_debug!("setpgid for {pid} from the parent failed: {err}");
                }
                dev_info!("spawned {:?} as {pid}", setup.command.get_program());
                Ok(pid)
            }
            Err(err) => {
                dev_warn!("unable to fork command process: {err}");
                Err(err)
            }
        };

        if let Some(set) = original_set {
            if let Err(err) = set.set_mask() {
                dev_warn!("cannot restore signal mask: {err}");
            }
        }

        result
    }
}

fn exec_child(setup: ChildSetup<'_>) -> ! {
    let ChildSetup {
        command,
        stdin,
        stdout,
        pgid,
        take_terminal,
    } = setup;

    if let Err(err) = setpgid(ProcessId::new(0), pgid.unwrap_or(ProcessId::new(0))) {
        dev_warn!("cannot join process group: {err}");
    }

    // Signals are still blocked, so this cannot stop us with SIGTTOU.
    if take_terminal {
        if let Err(err) = io::stdin().tcsetpgrp(getpgrp()) {
            dev_warn!("cannot take the terminal: {err}");
        }
    }

    if let Err(err) = reset_for_child() {
        dev_warn!("cannot reset signal handling: {err}");
        _exit(126);
    }

    for (source, target) in [(stdin, libc::STDIN_FILENO), (stdout, libc::STDOUT_FILENO)] {
        let Some(source) = source else {
            continue;
        };
        let result = if source == target {
            set_cloexec(target, false)
        } else {
            dup2(source, target)
        };
        if let Err(err) = result {
            dev_warn!("cannot set up descriptor {target}: {err}");
            _exit(126);
        }
    }

    let err = command.exec();

    let program = command.get_program().to_string_lossy();
    if err.kind() == io::ErrorKind::NotFound {
        user_error!("{program}: command not found");
        _exit(127)
    } else {
        user_error!("{program}: {err}");
        _exit(126)
    }
}

fn build_command(stage: &CommandStage, env: &Environment) -> Command {
    let mut command = Command::new(stage.program());
    command
        .args(stage.argv.iter().skip(1))
        .env_clear()
        .envs(env.iter());
    if env.get("PATH").is_none() {
        command.env("PATH", env.path());
    }
    command
}

fn open_target(target: &Target, write: bool, append: bool) -> Result<OwnedFd, LaunchError> {
    match target {
        Target::Fd(fd) => dup_cloexec(*fd).map_err(|source| LaunchError::Redirect {
            path: format!("&{fd}"),
            source,
        }),
        Target::Path(path) => {
            let mut options = OpenOptions::new();
            if write {
                options.write(true).create(true);
                if append {
                    options.append(true);
                } else {
                    options.truncate(true);
                }
            } else {
                options.read(true);
            }

            options
                .open(path)
                .map(OwnedFd::from)
                .map_err(|source| LaunchError::Redirect {
                    path: path.display().to_string(),
                    source,
                })
        }
    }
}

type Redirections = (Option<OwnedFd>, Option<OwnedFd>);

pub(super) fn open_redirections(stage: &CommandStage) -> Result<Redirections, LaunchError> {
    let input = stage
        .input
        .as_ref()
        .map(|target| open_target(target, false, false))
        .transpose()?;
    let output = stage
        .output
        .as_ref()
        .map(|target| open_target(target, true, stage.append))
        .transpose()?;
    Ok((input, output))
}

struct Launch<'a> {
    env: &'a Environment,
    spawner: &'a mut dyn Spawner,
    take_terminal: bool,
    pids: Vec<ProcessId>,
}

impl Launch<'_> {
    fn spawn_stages(
        &mut self,
        stages: &[CommandStage],
        redirections: Vec<Redirections>,
        mut input: Option<OwnedFd>,
        mut output: Option<OwnedFd>,
    ) -> Result<(), LaunchError> {
        let mut previous: Option<OwnedFd> = None;

        for (idx, (stage, (stage_in, stage_out))) in
            stages.iter().zip(redirections).enumerate()
        {
            let last = idx + 1 == stages.len();

            // a redirection of the stage itself beats the pipe and the job's overrides
            let stdin = match (stage_in, previous.take()) {
                (Some(fd), _) => Some(fd),
                (None, Some(read_end)) => Some(read_end),
                (None, None) if idx == 0 => input.take(),
                (None, None) => None,
            };

            let stdout = if last {
                stage_out.or_else(|| output.take())
            } else {
                let (read_end, write_end) = pipe().map_err(LaunchError::Pipe)?;
                previous = Some(read_end);
                Some(stage_out.unwrap_or(write_end))
            };

            let mut command = build_command(stage, self.env);
            let pid = self
                .spawner
                .spawn(ChildSetup {
                    command: &mut command,
                    stdin: stdin.as_ref().map(AsRawFd::as_raw_fd),
                    stdout: stdout.as_ref().map(AsRawFd::as_raw_fd),
                    pgid: self.pids.first().copied(),
                    take_terminal: self.take_terminal,
                })
                .map_err(|source| LaunchError::Spawn { stage: idx, source })?;

            self.pids.push(pid);
            // the child has its copies now
            drop(stdin);
            drop(stdout);
        }

        Ok(())
    }

    /// Kill and collect every process spawned so far.
    fn abandon(&self) {
        for &pid in &self.pids {
            if let Err(err) = kill(pid, SIGKILL) {
                dev_warn!("cannot kill {pid}: {err}");
            }
        }

        for &pid in &self.pids {
            loop {
                match pid.wait(WaitOptions::new()) {
                    Err(WaitError::Io(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => {
                        dev_warn!("cannot collect {pid}: {err:?}");
                        break;
                    }
                    Ok(_) => break,
                }
            }
        }
    }
}

/// Start every stage of `job` in one new process group and register it in `table`.
///
/// Redirections are opened before the first process is created. If creating any process fails,
/// the processes already started are killed and collected and the table is left unchanged.
pub(crate) fn launch(
    job: ExecutionJob,
    table: &mut JobTable,
    env: &Environment,
    settings: &Settings,
    spawner: &mut dyn Spawner,
    take_terminal: bool,
) -> Result<JobId, LaunchError> {
    let (commands, input, output) = job.into_parts();
    let stages = commands.stages();

    if stages.is_empty() {
        return Err(LaunchError::EmptyPipeline);
    }
    if stages.len() > settings.max_pipeline_stages {
        return Err(LaunchError::TooManyStages {
            stages: stages.len(),
            limit: settings.max_pipeline_stages,
        });
    }
    if table.is_full() {
        return Err(LaunchError::TableFull(table.capacity()));
    }

    let redirections = stages
        .iter()
        .map(open_redirections)
        .collect::<Result<Vec<_>, _>>()?;

    let mut launch = Launch {
        env,
        spawner,
        take_terminal,
        pids: Vec::with_capacity(stages.len()),
    };

    if let Err(err) = launch.spawn_stages(stages, redirections, input, output) {
        launch.abandon();
        return Err(err);
    }

    let pgid = launch.pids[0];
    match table.add(&launch.pids, pgid, commands.display()) {
        Some(id) => {
            dev_info!("job {id} started: {}", commands.display());
            Ok(id)
        }
        None => {
            launch.abandon();
            Err(LaunchError::TableFull(table.capacity()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        io::{self, Read},
        os::fd::OwnedFd,
    };

    use pretty_assertions::assert_eq;

    use super::{launch, ChildSetup, ForkSpawner, Spawner};
    use crate::ast::JobKind;
    use crate::common::Environment;
    use crate::defaults::Settings;
    use crate::exec::{CommandStage, CommandVector, ExecutionJob, LaunchError, Target};
    use crate::jobs::JobTable;
    use crate::system::{interface::ProcessId, kill, pipe};

    fn stages(commands: &[&[&str]]) -> CommandVector {
        let stages = commands
            .iter()
            .map(|argv| CommandStage::new(argv.iter().copied()))
            .collect();
        CommandVector::from_stages(stages, "test").unwrap()
    }

    fn run(job: ExecutionJob, table: &mut JobTable) -> Result<i32, LaunchError> {
        let id = launch(
            job,
            table,
            &Environment::from_process(),
            &Settings::default(),
            &mut ForkSpawner,
            false,
        )?;
        Ok(table.wait_for_job(id).unwrap())
    }

    fn read_all(fd: OwnedFd) -> String {
        let mut out = String::new();
        fs::File::from(fd).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn pipeline_output_reaches_the_override() {
        let mut table = JobTable::new(10);
        let (rx, tx) = pipe().unwrap();
        let job = ExecutionJob::new(
            stages(&[&["printf", "b\\na\\n"], &["sort"]]),
            JobKind::Pipeline,
        )
        .with_output(tx);

        assert_eq!(run(job, &mut table).unwrap(), 0);
        assert_eq!(read_all(rx), "a\nb\n");
    }

    #[test]
    fn input_override_feeds_the_first_stage() {
        let mut table = JobTable::new(10);
        let (in_rx, in_tx) = pipe().unwrap();
        let (out_rx, out_tx) = pipe().unwrap();
        drop(in_tx);
        let job = ExecutionJob::new(stages(&[&["wc", "-c"]]), JobKind::Pipeline)
            .with_input(in_rx)
            .with_output(out_tx);

        assert_eq!(run(job, &mut table).unwrap(), 0);
        assert_eq!(read_all(out_rx).trim(), "0");
    }

    #[test]
    fn status_comes_from_the_last_stage() {
        let mut table = JobTable::new(10);
        let job = ExecutionJob::new(
            stages(&[&["sh", "-c", "exit 5"], &["sh", "-c", "exit 3"]]),
            JobKind::Background,
        );
        assert_eq!(run(job, &mut table).unwrap(), 3);

        let job = ExecutionJob::new(stages(&[&["jobsh-no-such-program"]]), JobKind::Foreground);
        assert_eq!(run(job, &mut table).unwrap(), 127);
    }

    #[test]
    fn stages_share_one_process_group() {
        let mut table = JobTable::new(10);
        let (rx, tx) = pipe().unwrap();
        let job = ExecutionJob::new(
            stages(&[&["sh", "-c", "ps -o pgid= -p $$"], &["cat"]]),
            JobKind::Pipeline,
        )
        .with_output(tx);

        let id = launch(
            job,
            &mut table,
            &Environment::from_process(),
            &Settings::default(),
            &mut ForkSpawner,
            false,
        )
        .unwrap();
        let job = table.find_job_by_id(id).unwrap();
        let pids: Vec<_> = job.pids().collect();
        assert_eq!(job.pgid(), pids[0]);
        table.wait_for_job(id).unwrap();

        let printed = read_all(rx);
        if !printed.trim().is_empty() {
            assert_eq!(printed.trim(), pids[0].to_string());
        }
    }

    #[test]
    fn file_redirections() {
        let dir = std::env::temp_dir().join(format!("jobsh-launch-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("in.txt");
        let output = dir.join("out.txt");
        fs::write(&input, "hello\n").unwrap();
        fs::write(&output, "first\n").unwrap();

        let mut table = JobTable::new(10);
        let mut stage = CommandStage::new(["cat"]);
        stage.input = Some(Target::Path(input.clone()));
        stage.output = Some(Target::Path(output.clone()));
        stage.append = true;
        let job = ExecutionJob::new(
            CommandVector::from_stages(vec![stage], "cat").unwrap(),
            JobKind::Foreground,
        );
        assert_eq!(run(job, &mut table).unwrap(), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "first\nhello\n");

        let mut stage = CommandStage::new(["cat"]);
        stage.input = Some(Target::Path(dir.join("missing")));
        let job = ExecutionJob::new(
            CommandVector::from_stages(vec![stage], "cat").unwrap(),
            JobKind::Foreground,
        );
        assert!(matches!(
            run(job, &mut table),
            Err(LaunchError::Redirect { .. })
        ));
        assert_eq!(table.get_job_count(), 1);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn limits() {
        let mut settings = Settings::default();
        settings.max_pipeline_stages = 2;
        let mut table = JobTable::new(1);
        let env = Environment::from_process();

        let job = ExecutionJob::new(
            stages(&[&["true"], &["true"], &["true"]]),
            JobKind::Background,
        );
        assert!(matches!(
            launch(job, &mut table, &env, &settings, &mut ForkSpawner, false),
            Err(LaunchError::TooManyStages { stages: 3, limit: 2 })
        ));

        let job = ExecutionJob::new(stages(&[&["true"]]), JobKind::Background);
        let id = launch(job, &mut table, &env, &settings, &mut ForkSpawner, false).unwrap();
        let job = ExecutionJob::new(stages(&[&["true"]]), JobKind::Background);
        assert!(matches!(
            launch(job, &mut table, &env, &settings, &mut ForkSpawner, false),
            Err(LaunchError::TableFull(1))
        ));
        table.wait_for_job(id).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stages_hold_only_their_own_descriptors() {
        let dir = std::env::temp_dir().join(format!("jobsh-fds-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let listing = |name: &str| {
            let mut stage = CommandStage::new(["ls", "/proc/self/fd"]);
            stage.output = Some(Target::Path(dir.join(name)));
            stage
        };
        let from_null = |mut stage: CommandStage| {
            stage.input = Some(Target::Path("/dev/null".into()));
            stage
        };

        let mut table = JobTable::new(10);
        let single = ExecutionJob::new(
            CommandVector::from_stages(vec![from_null(listing("single"))], "ls").unwrap(),
            JobKind::Foreground,
        );
        assert_eq!(run(single, &mut table).unwrap(), 0);
        let baseline = fs::read_to_string(dir.join("single")).unwrap();
        // the standard streams and the directory ls is reading
        assert_eq!(baseline, "0\n1\n2\n3\n");

        let names = ["first", "second", "third"];
        let stages = names
            .iter()
            .enumerate()
            .map(|(idx, name)| match idx {
                0 => from_null(listing(name)),
                _ => listing(name),
            })
            .collect();
        let pipeline = ExecutionJob::new(
            CommandVector::from_stages(stages, "ls | ls | ls").unwrap(),
            JobKind::Foreground,
        );
        assert_eq!(run(pipeline, &mut table).unwrap(), 0);
        for name in names {
            assert_eq!(fs::read_to_string(dir.join(name)).unwrap(), baseline, "{name}");
        }

        fs::remove_dir_all(dir).unwrap();
    }

    /// Spawns for real a fixed number of times, then fails.
    struct FailAfter {
        remaining: usize,
        spawned: Vec<ProcessId>,
    }

    impl Spawner for FailAfter {
        fn spawn(&mut self, setup: ChildSetup<'_>) -> io::Result<ProcessId> {
            if self.remaining == 0 {
                return Err(io::Error::from_raw_os_error(libc::EAGAIN));
            }
            self.remaining -= 1;
            let pid = ForkSpawner.spawn(setup)?;
            self.spawned.push(pid);
            Ok(pid)
        }
    }

    #[test]
    fn partial_failure_cleans_up() {
        let mut table = JobTable::new(10);
        let mut spawner = FailAfter {
            remaining: 1,
            spawned: Vec::new(),
        };
        let job = ExecutionJob::new(
            stages(&[&["sleep", "30"], &["cat"], &["cat"]]),
            JobKind::Background,
        );

        let err = launch(
            job,
            &mut table,
            &Environment::from_process(),
            &Settings::default(),
            &mut spawner,
            false,
        )
        .unwrap_err();

        assert!(matches!(err, LaunchError::Spawn { stage: 1, .. }));
        assert_eq!(table.get_job_count(), 0);
        assert_eq!(spawner.spawned.len(), 1);
        // killed and collected, so the pid is gone
        assert!(kill(spawner.spawned[0], 0).is_err());
    }
}
