//! Per-application rolling logs - `logs/<app>.log`, newest line last

use std::path::PathBuf;

use chrono::Local;
use tracing::warn;

/// Something that happened to a managed application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Started,
    Stopped,
    StopNotFound,
    ToggledOn,
    ToggledOff,
    AutoRestart,
    ProfileStart(String),
    ProfileStop(String),
}

impl std::fmt::Display for LogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::StopNotFound => write!(f, "stop requested but not found"),
            Self::ToggledOn => write!(f, "toggled ON"),
            Self::ToggledOff => write!(f, "toggled OFF"),
            Self::AutoRestart => write!(f, "auto-restart (not running)"),
            Self::ProfileStart(profile) => write!(f, "profile '{}': start", profile),
            Self::ProfileStop(profile) => write!(f, "profile '{}': stop", profile),
        }
    }
}

/// Bounded text logs, one file per application
#[derive(Debug, Clone)]
pub struct AppLog {
    dir: PathBuf,
    max_lines: usize,
}

impl AppLog {
    pub fn new(dir: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            dir: dir.into(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    pub fn path_for(&self, app_name: &str) -> PathBuf {
        self.dir.join(format!("{}.log", file_stem(app_name)))
    }

    /// Append `<timestamp> | <event>`, dropping the oldest lines past the cap.
    /// Failures are reported and otherwise ignored.
    pub fn append(&self, app_name: &str, event: &LogEvent) {
        let line = format!("{} | {}", Local::now().format("%Y-%m-%d %H:%M:%S"), event);
        if let Err(e) = self.append_line(app_name, line) {
            warn!("Failed to write log for '{}': {}", app_name, e);
        }
    }

    fn append_line(&self, app_name: &str, line: String) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut lines = self.read(app_name);
        lines.push(line);
        let excess = lines.len().saturating_sub(self.max_lines);
        lines.drain(..excess);

        let mut text = lines.join("\n");
        text.push('\n');
        std::fs::write(self.path_for(app_name), text)
    }

    /// Current lines, oldest first; empty if the log does not exist
    pub fn read(&self, app_name: &str) -> Vec<String> {
        match std::fs::read(self.path_for(app_name)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Application names become file names; path separators and reserved
/// characters are replaced
fn file_stem(app_name: &str) -> String {
    let stem: String = app_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        stem
    }
}
