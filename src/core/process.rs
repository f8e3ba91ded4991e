//! Process management - Starting applications and terminating process trees

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::app::{AppDescriptor, LaunchTarget};
use super::matcher::ProcessMatcher;
use super::snapshot::{LiveProcessHandle, ProcessSnapshot, ProcessTable};
use crate::persistence::{AppLog, LogEvent};

/// Poll period while waiting for processes to exit
const EXIT_POLL: Duration = Duration::from_millis(50);

/// How long a force-killed process may take to disappear
const KILL_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum StartError {
    #[error("No valid path or command for '{0}'")]
    NoLaunchTarget(String),
    #[error("Failed to start '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("Process {0} survived a forced kill")]
    Survived(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A matching process was already running; nothing was launched
    AlreadyRunning(u32),
    /// A new process was spawned
    Spawned(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// These processes (and their descendants) were terminated
    Stopped(Vec<u32>),
    /// Nothing matched; the goal state already holds
    NotFound,
}

/// Starts applications that are not already running
#[derive(Debug, Clone)]
pub struct Launcher {
    /// Base for relative working directories
    base_dir: PathBuf,
}

impl Launcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Start `app` unless `snapshot` already shows it running
    pub fn start<T: ProcessTable>(
        &self,
        table: &mut T,
        matcher: &ProcessMatcher,
        app: &AppDescriptor,
        snapshot: &ProcessSnapshot,
        log: &AppLog,
    ) -> Result<StartOutcome, StartError> {
        if let Some(existing) = matcher.find(app, snapshot) {
            debug!("'{}' already running (pid={}), skipping start", app.name, existing.pid);
            return Ok(StartOutcome::AlreadyRunning(existing.pid));
        }

        let target = app
            .launch_target()
            .ok_or_else(|| StartError::NoLaunchTarget(app.name.clone()))?;
        let cwd = app.working_directory(&self.base_dir);

        info!("Starting '{}' via {}", app.name, target);
        let pid = table
            .spawn(&target, cwd.as_deref())
            .map_err(|source| StartError::SpawnFailed {
                name: app.name.clone(),
                source,
            })?;

        info!("Started '{}' with PID {}", app.name, pid);
        log.append(&app.name, &LogEvent::Started);
        Ok(StartOutcome::Spawned(pid))
    }
}

/// Stops an application's process together with everything it spawned
#[derive(Debug, Clone)]
pub struct TreeTerminator {
    /// Grace period for descendants after the polite request
    child_grace: Duration,
    /// Grace period for the target itself
    target_grace: Duration,
}

impl TreeTerminator {
    pub fn new(child_grace: Duration, target_grace: Duration) -> Self {
        Self {
            child_grace,
            target_grace,
        }
    }

    /// Stop `app`, preferring the cached handle when it still identifies it.
    ///
    /// A stale handle (gone, or its pid now belongs to something else) is
    /// never signalled; the process table is rescanned instead.
    pub fn stop<T: ProcessTable>(
        &self,
        table: &mut T,
        matcher: &ProcessMatcher,
        app: &AppDescriptor,
        cached: Option<&LiveProcessHandle>,
        log: &AppLog,
    ) -> Result<StopOutcome, StopError> {
        let mut targets = Vec::new();

        if let Some(handle) = cached {
            match table.probe(handle.pid) {
                Some(current) if matcher.is_same_app(app, &current) => targets.push(current.pid),
                Some(current) => warn!(
                    "Stored PID {} ({}) no longer matches '{}', scanning system",
                    current.pid, current.name, app.name
                ),
                None => debug!("Stored PID {} for '{}' is gone", handle.pid, app.name),
            }
        }

        if targets.is_empty() {
            let snapshot = table.snapshot();
            targets = matcher
                .find_all(app, &snapshot)
                .into_iter()
                .map(|p| p.pid)
                .collect();
        }

        if targets.is_empty() {
            info!("No running process found for '{}'", app.name);
            log.append(&app.name, &LogEvent::StopNotFound);
            return Ok(StopOutcome::NotFound);
        }

        let mut result = Ok(());
        for &pid in &targets {
            info!("Stopping '{}' (PID {})", app.name, pid);
            if let Err(e) = self.kill_tree(table, pid) {
                warn!("Failed to stop '{}': {}", app.name, e);
                result = Err(e);
            }
        }

        log.append(&app.name, &LogEvent::Stopped);
        result.map(|()| StopOutcome::Stopped(targets))
    }

    /// Terminate `pid` and all its descendants, escalating to a forced kill
    pub fn kill_tree<T: ProcessTable>(&self, table: &mut T, pid: u32) -> Result<(), StopError> {
        if pid == table.own_pid() {
            warn!("Refusing to terminate our own process");
            return Ok(());
        }

        let Some(target) = table.probe(pid) else {
            debug!("Process {} already exited", pid);
            return Ok(());
        };
        // Identities are captured before any signal so a reused pid is never chased
        let descendants: Vec<LiveProcessHandle> = table
            .descendants(pid)
            .into_iter()
            .filter_map(|child| table.probe(child))
            .collect();

        for child in &descendants {
            table.terminate(child.pid);
        }
        for child in wait_for_exit(table, &descendants, self.child_grace) {
            debug!("Descendant {} ignored terminate, killing", child.pid);
            table.kill(child.pid);
        }

        table.terminate(pid);
        if !wait_for_exit(table, std::slice::from_ref(&target), self.target_grace).is_empty() {
            debug!("Process {} ignored terminate, killing", pid);
            table.kill(pid);
        }

        let mut tree = descendants;
        tree.push(target);
        match wait_for_exit(table, &tree, KILL_SETTLE).first() {
            Some(survivor) => Err(StopError::Survived(survivor.pid)),
            None => Ok(()),
        }
    }
}

/// Whether the process captured in `handle` is still the one holding its pid
fn still_running<T: ProcessTable>(table: &mut T, handle: &LiveProcessHandle) -> bool {
    table.probe(handle.pid).is_some_and(|current| current == *handle)
}

/// Wait until every process is gone or `timeout` expires; returns the survivors
fn wait_for_exit<T: ProcessTable>(
    table: &mut T,
    processes: &[LiveProcessHandle],
    timeout: Duration,
) -> Vec<LiveProcessHandle> {
    let deadline = Instant::now() + timeout;
    loop {
        let alive: Vec<LiveProcessHandle> = processes
            .iter()
            .filter(|p| still_running(table, p))
            .cloned()
            .collect();
        let now = Instant::now();
        if alive.is_empty() || now >= deadline {
            return alive;
        }
        std::thread::sleep(EXIT_POLL.min(deadline - now));
    }
}

/// Spawn a process detached from ours, with no console window and null stdio
pub fn spawn_detached(target: &LaunchTarget<'_>, cwd: Option<&Path>) -> std::io::Result<Child> {
    let mut cmd = match target {
        LaunchTarget::Direct { path, args } => {
            let mut cmd = Command::new(path);
            cmd.args(args.iter());
            // Default to the executable's own directory
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                cmd.current_dir(parent);
            }

            #[cfg(windows)]
            {
                use std::os::windows::process::CommandExt;
                cmd.creation_flags(0x00000008); // DETACHED_PROCESS
            }
            cmd
        }
        LaunchTarget::Shell(command) => shell_command(command),
    };

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    use std::os::windows::process::CommandExt;

    let mut cmd = Command::new("cmd");
    cmd.raw_arg("/C").raw_arg(command);
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::FakeProcesses;

    const OWN_PID: u32 = 1;

    fn matcher() -> ProcessMatcher {
        ProcessMatcher::new(OWN_PID, &["python".to_string()])
    }

    fn terminator() -> TreeTerminator {
        TreeTerminator::new(Duration::from_millis(20), Duration::from_millis(20))
    }

    fn log() -> (tempfile::TempDir, AppLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = AppLog::new(dir.path().join("logs"), 50);
        (dir, log)
    }

    #[test]
    fn test_start_twice_spawns_once() {
        let (_dir, log) = log();
        let mut table = FakeProcesses::new(OWN_PID);
        table.on_spawn("notepad", "notepad.exe", &[]);
        let app = AppDescriptor::shell("Notes", "notepad.exe", "notepad");
        let launcher = Launcher::new("/tmp");

        let snapshot = table.snapshot();
        let first = launcher.start(&mut table, &matcher(), &app, &snapshot, &log).unwrap();
        assert!(matches!(first, StartOutcome::Spawned(_)));

        let snapshot = table.snapshot();
        let second = launcher.start(&mut table, &matcher(), &app, &snapshot, &log).unwrap();
        assert!(matches!(second, StartOutcome::AlreadyRunning(_)));

        assert_eq!(table.spawned.len(), 1);
        assert_eq!(table.alive_named("notepad.exe"), 1);
        assert_eq!(log.read("Notes").len(), 1);
        assert!(log.read("Notes")[0].ends_with("| started"));
    }

    #[test]
    fn test_start_without_target() {
        let (_dir, log) = log();
        let mut table = FakeProcesses::new(OWN_PID);
        let app = AppDescriptor::executable("Gone", "gone.exe", "/definitely/not/here/gone.exe");
        let snapshot = table.snapshot();
        let result = Launcher::new("/tmp").start(&mut table, &matcher(), &app, &snapshot, &log);
        assert!(matches!(result, Err(StartError::NoLaunchTarget(name)) if name == "Gone"));
        assert!(table.spawned.is_empty());
        assert!(log.read("Gone").is_empty());
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let (_dir, log) = log();
        let mut table = FakeProcesses::new(OWN_PID);
        table.fail_spawns = true;
        let app = AppDescriptor::shell("Broken", "broken.exe", "broken");
        let snapshot = table.snapshot();
        let result = Launcher::new("/tmp").start(&mut table, &matcher(), &app, &snapshot, &log);
        assert!(matches!(result, Err(StartError::SpawnFailed { .. })));
    }

    #[test]
    fn test_shell_launch_uses_resolved_cwd() {
        let (_dir, log) = log();
        let mut table = FakeProcesses::new(OWN_PID);
        let app = AppDescriptor::shell("Sync", "rclone.exe", "rclone mount").with_cwd(".");
        let snapshot = table.snapshot();
        Launcher::new("/data")
            .start(&mut table, &matcher(), &app, &snapshot, &log)
            .unwrap();
        assert_eq!(table.spawned[0].target, "rclone mount");
        assert_eq!(table.spawned[0].cwd.as_deref(), Some(Path::new("/data")));
    }

    #[test]
    fn test_stop_when_nothing_runs_is_success() {
        let (_dir, log) = log();
        let mut table = FakeProcesses::new(OWN_PID);
        let app = AppDescriptor::shell("Notes", "notepad.exe", "notepad");
        let outcome = terminator()
            .stop(&mut table, &matcher(), &app, None, &log)
            .unwrap();
        assert_eq!(outcome, StopOutcome::NotFound);
        assert!(log.read("Notes")[0].ends_with("| stop requested but not found"));
    }

    #[test]
    fn test_tree_kill_takes_descendants() {
        let mut table = FakeProcesses::new(OWN_PID);
        let root = table.add("cmd.exe", &["/C", "rclone mount"]);
        let child = table.add_child(root, "rclone.exe", &[]);
        let grandchild = table.add_child(child, "conhost.exe", &[]);
        table.set_stubborn(grandchild);

        terminator().kill_tree(&mut table, root).unwrap();

        for pid in [root, child, grandchild] {
            assert!(!table.is_alive(pid));
        }
        assert_eq!(table.killed, vec![grandchild]);
        // Descendants are asked before the root
        assert_eq!(table.terminated.last(), Some(&root));
    }

    #[test]
    fn test_stubborn_target_is_force_killed() {
        let mut table = FakeProcesses::new(OWN_PID);
        let root = table.add("game.exe", &[]);
        table.set_stubborn(root);
        terminator().kill_tree(&mut table, root).unwrap();
        assert_eq!(table.killed, vec![root]);
        assert!(!table.is_alive(root));
    }

    #[test]
    fn test_reused_pid_during_grace_is_left_alone() {
        let mut table = FakeProcesses::new(OWN_PID);
        let root = table.add("rclone.exe", &["mount"]);
        let child = table.add_child(root, "rclone.exe", &["serve"]);
        table.reuse_after_exit(root, "notepad.exe", &[]);
        table.reuse_after_exit(child, "calc.exe", &[]);

        terminator().kill_tree(&mut table, root).unwrap();

        assert!(table.killed.is_empty());
        assert_eq!(table.probe(root).map(|p| p.name), Some("notepad.exe".to_string()));
        assert_eq!(table.probe(child).map(|p| p.name), Some("calc.exe".to_string()));
    }

    #[test]
    fn test_stale_handle_is_not_signalled() {
        let (_dir, log) = log();
        let mut table = FakeProcesses::new(OWN_PID);
        let app = AppDescriptor::script("Wallpaper", "pythonw.exe", "pythonw.exe wallch.py", "wallch.py");
        // The cached pid now belongs to another script
        let reused = table.add("pythonw.exe", &["other.py"]);
        let real = table.add("pythonw.exe", &["wallch.py"]);
        let stale = LiveProcessHandle::new(reused, "pythonw.exe", vec!["wallch.py".into()]);

        let outcome = terminator()
            .stop(&mut table, &matcher(), &app, Some(&stale), &log)
            .unwrap();

        assert_eq!(outcome, StopOutcome::Stopped(vec![real]));
        assert!(table.is_alive(reused));
        assert!(!table.terminated.contains(&reused));
    }

    #[test]
    fn test_stop_never_targets_own_process() {
        let (_dir, log) = log();
        let mut table = FakeProcesses::new(OWN_PID);
        table.add_with_pid(OWN_PID, "python.exe", &["keeper.py"]);
        let app = AppDescriptor::script("Keeper", "python.exe", "python keeper.py", "keeper.py");
        let outcome = terminator()
            .stop(&mut table, &matcher(), &app, None, &log)
            .unwrap();
        assert_eq!(outcome, StopOutcome::NotFound);
        assert!(table.terminated.is_empty());
    }
}
