//! Process table - Point-in-time view of the OS processes and the operations on them

use std::collections::HashMap;
use std::io;
use std::path::Path;

use super::app::LaunchTarget;
use super::resource::ResourceUsage;

/// A live process as captured by a snapshot or a probe.
///
/// Valid only until the next re-validation: the pid may be reused by an
/// unrelated program at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveProcessHandle {
    pub pid: u32,
    /// Executable name as reported by the OS
    pub name: String,
    /// Command-line arguments, the executable first
    pub cmd: Vec<String>,
}

impl LiveProcessHandle {
    pub fn new(pid: u32, name: impl Into<String>, cmd: Vec<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            cmd,
        }
    }
}

/// All enumerable processes grouped by lowercase executable name, in
/// enumeration order within each group
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    by_name: HashMap<String, Vec<LiveProcessHandle>>,
    len: usize,
}

impl ProcessSnapshot {
    pub fn from_processes(processes: impl IntoIterator<Item = LiveProcessHandle>) -> Self {
        let mut by_name: HashMap<String, Vec<LiveProcessHandle>> = HashMap::new();
        let mut len = 0;
        for process in processes {
            if process.name.is_empty() {
                continue;
            }
            by_name
                .entry(process.name.to_lowercase())
                .or_default()
                .push(process);
            len += 1;
        }
        Self { by_name, len }
    }

    /// Processes whose executable name equals `process_name`, ignoring case
    pub fn candidates(&self, process_name: &str) -> &[LiveProcessHandle] {
        self.by_name
            .get(&process_name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Everything the supervisor needs from the operating system.
///
/// Processes that cannot be inspected (access denied, exited mid-scan) are
/// simply absent; none of these calls fail on them.
pub trait ProcessTable {
    /// Pid of the supervisor itself
    fn own_pid(&self) -> u32;

    /// Enumerate every process. Never cached across calls.
    fn snapshot(&mut self) -> ProcessSnapshot;

    /// Re-read a single process. `None` if it is gone or a zombie.
    fn probe(&mut self, pid: u32) -> Option<LiveProcessHandle>;

    /// Usage figures from the most recent probe or snapshot
    fn usage(&self, pid: u32) -> Option<ResourceUsage>;

    /// All descendants of `pid`, children before grandchildren
    fn descendants(&mut self, pid: u32) -> Vec<u32>;

    /// Ask a process to exit. Returns whether a signal was delivered.
    fn terminate(&mut self, pid: u32) -> bool;

    /// Force a process to exit. Returns whether a signal was delivered.
    fn kill(&mut self, pid: u32) -> bool;

    /// Start a detached process and return its pid
    fn spawn(&mut self, target: &LaunchTarget<'_>, cwd: Option<&Path>) -> io::Result<u32>;

    fn is_alive(&mut self, pid: u32) -> bool {
        self.probe(pid).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(pid: u32, name: &str) -> LiveProcessHandle {
        LiveProcessHandle::new(pid, name, vec![name.to_string()])
    }

    #[test]
    fn test_grouping_is_case_insensitive_and_ordered() {
        let snapshot = ProcessSnapshot::from_processes(vec![
            handle(30, "PythonW.exe"),
            handle(10, "explorer.exe"),
            handle(20, "pythonw.exe"),
        ]);
        let pids: Vec<u32> = snapshot
            .candidates("PYTHONW.EXE")
            .iter()
            .map(|p| p.pid)
            .collect();
        assert_eq!(pids, vec![30, 20]);
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.candidates("missing.exe").is_empty());
    }

    #[test]
    fn test_nameless_processes_are_skipped() {
        let snapshot = ProcessSnapshot::from_processes(vec![handle(1, ""), handle(2, "init")]);
        assert_eq!(snapshot.len(), 1);
    }
}
