//! Process matching - Decide which live process IS a managed application

use super::app::AppDescriptor;
use super::snapshot::{LiveProcessHandle, ProcessSnapshot};

/// Matches descriptors against live processes.
///
/// Never returns the supervisor's own process.
#[derive(Debug, Clone)]
pub struct ProcessMatcher {
    own_pid: u32,
    /// Lowercase substrings that mark an executable as a script host
    interpreter_markers: Vec<String>,
}

impl ProcessMatcher {
    pub fn new(own_pid: u32, interpreter_markers: &[String]) -> Self {
        Self {
            own_pid,
            interpreter_markers: interpreter_markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// First live process that is `app`.
    ///
    /// Without a fingerprint the first candidate in enumeration order wins;
    /// which one that is depends on the OS.
    pub fn find(&self, app: &AppDescriptor, snapshot: &ProcessSnapshot) -> Option<LiveProcessHandle> {
        snapshot
            .candidates(&app.process_name)
            .iter()
            .find(|candidate| self.is_same_app(app, candidate))
            .cloned()
    }

    /// Every live process that is `app`
    pub fn find_all(&self, app: &AppDescriptor, snapshot: &ProcessSnapshot) -> Vec<LiveProcessHandle> {
        snapshot
            .candidates(&app.process_name)
            .iter()
            .filter(|candidate| self.is_same_app(app, candidate))
            .cloned()
            .collect()
    }

    /// Whether `process` still is `app`: same executable name and, for
    /// scripts, an interpreter host carrying the fingerprint
    pub fn is_same_app(&self, app: &AppDescriptor, process: &LiveProcessHandle) -> bool {
        if process.pid == self.own_pid {
            return false;
        }
        if process.name.to_lowercase() != app.process_name.to_lowercase() {
            return false;
        }
        match app.fingerprint() {
            None => true,
            Some(fingerprint) => {
                self.is_interpreter(&process.name) && carries_fingerprint(&process.cmd, fingerprint)
            }
        }
    }

    pub fn is_interpreter(&self, executable_name: &str) -> bool {
        let name = executable_name.to_lowercase();
        self.interpreter_markers
            .iter()
            .any(|marker| name.contains(marker.as_str()))
    }
}

/// Case-insensitive substring search over every argument token
fn carries_fingerprint(cmd: &[String], fingerprint: &str) -> bool {
    let target = fingerprint.to_lowercase();
    if target.is_empty() {
        return false;
    }
    cmd.iter()
        .flat_map(|arg| std::iter::once(arg.as_str()).chain(arg.split_whitespace()))
        .any(|token| token.to_lowercase().contains(&target))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN_PID: u32 = 4242;

    fn matcher() -> ProcessMatcher {
        ProcessMatcher::new(OWN_PID, &["python".to_string()])
    }

    fn wallpaper() -> AppDescriptor {
        AppDescriptor::script("Wallpaper", "pythonw.exe", "pythonw.exe wallch.py", "wallch.py")
    }

    fn proc(pid: u32, name: &str, args: &[&str]) -> LiveProcessHandle {
        let mut cmd = vec![name.to_string()];
        cmd.extend(args.iter().map(|a| a.to_string()));
        LiveProcessHandle::new(pid, name, cmd)
    }

    #[test]
    fn test_plain_app_takes_first_candidate() {
        let app = AppDescriptor::shell("Notes", "Notepad.exe", "notepad");
        let snapshot = ProcessSnapshot::from_processes(vec![
            proc(7, "notepad.exe", &[]),
            proc(3, "notepad.exe", &[]),
        ]);
        assert_eq!(matcher().find(&app, &snapshot).map(|p| p.pid), Some(7));
    }

    #[test]
    fn test_no_candidate_means_none() {
        let app = AppDescriptor::shell("Notes", "notepad.exe", "notepad");
        let snapshot = ProcessSnapshot::from_processes(vec![proc(1, "explorer.exe", &[])]);
        assert!(matcher().find(&app, &snapshot).is_none());
    }

    #[test]
    fn test_fingerprint_gate_rejects_other_scripts() {
        let snapshot = ProcessSnapshot::from_processes(vec![proc(
            11,
            "pythonw.exe",
            &["C:\\tools\\other.py", "--flag"],
        )]);
        assert!(matcher().find(&wallpaper(), &snapshot).is_none());
    }

    #[test]
    fn test_fingerprint_found_in_any_argument() {
        let snapshot = ProcessSnapshot::from_processes(vec![
            proc(11, "pythonw.exe", &["other.py"]),
            proc(12, "pythonw.exe", &["C:\\Tools\\WALLCH.PY", "--interval", "60"]),
        ]);
        assert_eq!(
            matcher().find(&wallpaper(), &snapshot).map(|p| p.pid),
            Some(12)
        );
    }

    #[test]
    fn test_fingerprint_inside_single_command_line_string() {
        let snapshot = ProcessSnapshot::from_processes(vec![proc(
            12,
            "pythonw.exe",
            &["wallch.py \"D:\\Pictures\" --shuffle"],
        )]);
        assert!(matcher().find(&wallpaper(), &snapshot).is_some());
    }

    #[test]
    fn test_non_interpreter_never_matches_fingerprinted_app() {
        let app = AppDescriptor::script("Wallpaper", "pythnw.exe", "pythnw.exe wallch.py", "wallch.py");
        let snapshot =
            ProcessSnapshot::from_processes(vec![proc(5, "pythnw.exe", &["wallch.py"])]);
        assert!(matcher().find(&app, &snapshot).is_none());
    }

    #[test]
    fn test_own_process_is_never_matched() {
        let app = AppDescriptor::script("Self", "python.exe", "python keeper.py", "keeper.py");
        let snapshot = ProcessSnapshot::from_processes(vec![
            proc(OWN_PID, "python.exe", &["keeper.py"]),
            proc(99, "python.exe", &["keeper.py"]),
        ]);
        let found = matcher().find_all(&app, &snapshot);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 99);
    }

    #[test]
    fn test_pid_reuse_detected_by_name() {
        let app = AppDescriptor::shell("Notes", "notepad.exe", "notepad");
        let reused = proc(7, "calc.exe", &[]);
        assert!(!matcher().is_same_app(&app, &reused));
    }
}
