//! Process monitoring - The live OS process table, backed by sysinfo

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::Path;
use std::process::Child;

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::{debug, trace};

use super::app::LaunchTarget;
use super::process::spawn_detached;
use super::resource::ResourceUsage;
use super::snapshot::{LiveProcessHandle, ProcessSnapshot, ProcessTable};

/// The operating system's process table
pub struct SystemProcesses {
    /// System information
    system: System,
    /// Our own pid, never reported as a match or signalled
    own_pid: u32,
    /// Processes we spawned, kept so they can be reaped once they exit
    children: HashMap<u32, Child>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            own_pid: std::process::id(),
            children: HashMap::new(),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::new()
            .with_cpu()
            .with_memory()
            .with_cmd(UpdateKind::Always)
    }

    fn refresh_all(&mut self) {
        self.reap_children();
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
    }

    fn refresh_one(&mut self, pid: Pid) {
        self.reap_children();
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, Self::refresh_kind());
    }

    /// Collect exit statuses of our own children so they do not linger as zombies
    fn reap_children(&mut self) {
        self.children.retain(|pid, child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Spawned process {} exited with {}", pid, status);
                false
            }
            Err(_) => false,
        });
    }

    fn is_live(process: &Process) -> bool {
        process.thread_kind().is_none() && !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
    }

    fn handle_of(pid: Pid, process: &Process) -> LiveProcessHandle {
        LiveProcessHandle {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().to_string(),
            cmd: process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect(),
        }
    }

    fn live_process(&mut self, pid: u32) -> Option<&Process> {
        let pid = Pid::from_u32(pid);
        if self.system.process(pid).is_none() {
            self.refresh_one(pid);
        }
        self.system.process(pid).filter(|p| Self::is_live(p))
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcesses {
    fn own_pid(&self) -> u32 {
        self.own_pid
    }

    fn snapshot(&mut self) -> ProcessSnapshot {
        self.refresh_all();
        let snapshot = ProcessSnapshot::from_processes(
            self.system
                .processes()
                .iter()
                .filter(|(_, process)| Self::is_live(process))
                .map(|(pid, process)| Self::handle_of(*pid, process)),
        );
        trace!("Process snapshot with {} entries", snapshot.len());
        snapshot
    }

    fn probe(&mut self, pid: u32) -> Option<LiveProcessHandle> {
        let spid = Pid::from_u32(pid);
        self.refresh_one(spid);
        self.system
            .process(spid)
            .filter(|p| Self::is_live(p))
            .map(|p| Self::handle_of(spid, p))
    }

    fn usage(&self, pid: u32) -> Option<ResourceUsage> {
        let process = self.system.process(Pid::from_u32(pid))?;
        Some(ResourceUsage {
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
        })
    }

    fn descendants(&mut self, pid: u32) -> Vec<u32> {
        self.refresh_all();

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (child, process) in self.system.processes() {
            if !Self::is_live(process) {
                continue;
            }
            if let Some(parent) = process.parent() {
                children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(child.as_u32());
            }
        }

        let mut found = Vec::new();
        let mut seen = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        while let Some(current) = queue.pop_front() {
            for &child in children.get(&current).map(Vec::as_slice).unwrap_or(&[]) {
                if child != self.own_pid && seen.insert(child) {
                    found.push(child);
                    queue.push_back(child);
                }
            }
        }
        found
    }

    fn terminate(&mut self, pid: u32) -> bool {
        if pid == self.own_pid {
            return false;
        }
        match self.live_process(pid) {
            // No graceful signal on this platform: fall back to a forced kill
            Some(process) => process.kill_with(Signal::Term).unwrap_or_else(|| process.kill()),
            None => false,
        }
    }

    fn kill(&mut self, pid: u32) -> bool {
        if pid == self.own_pid {
            return false;
        }
        match self.live_process(pid) {
            Some(process) => process.kill(),
            None => false,
        }
    }

    fn spawn(&mut self, target: &LaunchTarget<'_>, cwd: Option<&Path>) -> io::Result<u32> {
        let child = spawn_detached(target, cwd)?;
        let pid = child.id();
        self.children.insert(pid, child);
        Ok(pid)
    }
}
