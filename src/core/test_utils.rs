//! Scripted in-memory process table for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use super::app::LaunchTarget;
use super::resource::ResourceUsage;
use super::snapshot::{LiveProcessHandle, ProcessSnapshot, ProcessTable};

#[derive(Debug, Clone)]
struct FakeProcess {
    pid: u32,
    parent: Option<u32>,
    name: String,
    cmd: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRecord {
    /// The launch target as displayed
    pub target: String,
    pub cwd: Option<PathBuf>,
}

/// Process table whose contents the test controls.
///
/// Processes live in insertion order, which is also their enumeration order.
/// Stubborn processes ignore `terminate` and only die on `kill`.
#[derive(Debug)]
pub struct FakeProcesses {
    own_pid: u32,
    next_pid: u32,
    processes: Vec<FakeProcess>,
    stubborn: HashSet<u32>,
    /// Pids handed to a new process as soon as their owner is terminated
    reused: HashMap<u32, (String, Vec<String>)>,
    /// What a spawn of a given target string brings to life
    spawn_rules: HashMap<String, (String, Vec<String>)>,
    pub fail_spawns: bool,
    pub spawned: Vec<SpawnRecord>,
    pub terminated: Vec<u32>,
    pub killed: Vec<u32>,
    pub snapshots: usize,
}

impl FakeProcesses {
    pub fn new(own_pid: u32) -> Self {
        Self {
            own_pid,
            next_pid: 100,
            processes: Vec::new(),
            stubborn: HashSet::new(),
            reused: HashMap::new(),
            spawn_rules: HashMap::new(),
            fail_spawns: false,
            spawned: Vec::new(),
            terminated: Vec::new(),
            killed: Vec::new(),
            snapshots: 0,
        }
    }

    /// Spawning `target` starts a process called `name` with `args`
    pub fn on_spawn(&mut self, target: &str, name: &str, args: &[&str]) {
        self.spawn_rules.insert(
            target.to_string(),
            (name.to_string(), args.iter().map(|a| a.to_string()).collect()),
        );
    }

    pub fn add(&mut self, name: &str, args: &[&str]) -> u32 {
        let pid = self.allocate_pid();
        self.insert(pid, None, name, args);
        pid
    }

    pub fn add_with_pid(&mut self, pid: u32, name: &str, args: &[&str]) {
        self.insert(pid, None, name, args);
    }

    pub fn add_child(&mut self, parent: u32, name: &str, args: &[&str]) -> u32 {
        let pid = self.allocate_pid();
        self.insert(pid, Some(parent), name, args);
        pid
    }

    pub fn set_stubborn(&mut self, pid: u32) {
        self.stubborn.insert(pid);
    }

    /// Once `pid` is terminated, the OS hands it to `name` right away
    pub fn reuse_after_exit(&mut self, pid: u32, name: &str, args: &[&str]) {
        self.reused.insert(
            pid,
            (name.to_string(), args.iter().map(|a| a.to_string()).collect()),
        );
    }

    /// Something outside the supervisor ended the process
    pub fn exit(&mut self, pid: u32) {
        self.processes.retain(|p| p.pid != pid);
    }

    pub fn alive_named(&self, name: &str) -> usize {
        self.processes
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .count()
    }

    fn allocate_pid(&mut self) -> u32 {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    fn insert(&mut self, pid: u32, parent: Option<u32>, name: &str, args: &[&str]) {
        let mut cmd = vec![name.to_string()];
        cmd.extend(args.iter().map(|a| a.to_string()));
        self.processes.push(FakeProcess {
            pid,
            parent,
            name: name.to_string(),
            cmd,
        });
    }

    fn handle(process: &FakeProcess) -> LiveProcessHandle {
        LiveProcessHandle::new(process.pid, process.name.clone(), process.cmd.clone())
    }

    fn exists(&self, pid: u32) -> bool {
        self.processes.iter().any(|p| p.pid == pid)
    }
}

impl ProcessTable for FakeProcesses {
    fn own_pid(&self) -> u32 {
        self.own_pid
    }

    fn snapshot(&mut self) -> ProcessSnapshot {
        self.snapshots += 1;
        ProcessSnapshot::from_processes(self.processes.iter().map(Self::handle))
    }

    fn probe(&mut self, pid: u32) -> Option<LiveProcessHandle> {
        self.processes.iter().find(|p| p.pid == pid).map(Self::handle)
    }

    fn usage(&self, pid: u32) -> Option<ResourceUsage> {
        self.exists(pid).then_some(ResourceUsage {
            cpu_percent: 1.5,
            memory_bytes: 4 * 1024 * 1024,
        })
    }

    fn descendants(&mut self, pid: u32) -> Vec<u32> {
        let mut found = Vec::new();
        let mut queue = VecDeque::from([pid]);
        while let Some(current) = queue.pop_front() {
            for child in self.processes.iter().filter(|p| p.parent == Some(current)) {
                if child.pid != self.own_pid && !found.contains(&child.pid) {
                    found.push(child.pid);
                    queue.push_back(child.pid);
                }
            }
        }
        found
    }

    fn terminate(&mut self, pid: u32) -> bool {
        if pid == self.own_pid || !self.exists(pid) {
            return false;
        }
        self.terminated.push(pid);
        if !self.stubborn.contains(&pid) {
            self.exit(pid);
            if let Some((name, args)) = self.reused.remove(&pid) {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                self.insert(pid, None, &name, &args);
            }
        }
        true
    }

    fn kill(&mut self, pid: u32) -> bool {
        if pid == self.own_pid || !self.exists(pid) {
            return false;
        }
        self.killed.push(pid);
        self.exit(pid);
        true
    }

    fn spawn(&mut self, target: &LaunchTarget<'_>, cwd: Option<&Path>) -> io::Result<u32> {
        if self.fail_spawns {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
        }
        let target = target.to_string();
        self.spawned.push(SpawnRecord {
            target: target.clone(),
            cwd: cwd.map(Path::to_path_buf),
        });

        let pid = self.allocate_pid();
        if let Some((name, args)) = self.spawn_rules.get(&target).cloned() {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            self.insert(pid, None, &name, &args);
        }
        Ok(pid)
    }
}
