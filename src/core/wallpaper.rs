//! Wallpaper helper - File-based control channel to the wallpaper rotation script

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::app::{AppDescriptor, LaunchKind};

/// Script file name identifying the helper among the managed applications
pub const HELPER_SCRIPT: &str = "wallch.py";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallpaperCommand {
    Pause,
    Resume,
    Toggle,
    Next,
    Quit,
}

impl WallpaperCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Toggle => "toggle",
            Self::Next => "next",
            Self::Quit => "quit",
        }
    }
}

/// What the helper last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WallpaperStatus {
    Playing,
    Paused,
    Stopped,
    #[default]
    Unknown,
}

impl WallpaperStatus {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "Playing" => Self::Playing,
            "Paused" => Self::Paused,
            "Stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
            Self::Unknown => "Unknown",
        }
    }
}

/// The two files shared with the helper. The helper consumes and deletes
/// the command file; we only ever read the status file.
#[derive(Debug, Clone)]
pub struct WallpaperHelper {
    command_file: PathBuf,
    status_file: PathBuf,
}

impl WallpaperHelper {
    pub fn new(command_file: impl Into<PathBuf>, status_file: impl Into<PathBuf>) -> Self {
        Self {
            command_file: command_file.into(),
            status_file: status_file.into(),
        }
    }

    pub fn send(&self, command: WallpaperCommand) -> std::io::Result<()> {
        debug!("Sending '{}' to wallpaper helper", command.as_str());
        std::fs::write(&self.command_file, format!("{}\n", command.as_str()))
    }

    pub fn status(&self) -> WallpaperStatus {
        match std::fs::read_to_string(&self.status_file) {
            Ok(text) => WallpaperStatus::parse(&text),
            Err(_) => WallpaperStatus::Unknown,
        }
    }
}

/// Helper options, `wallpaper.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallpaperSettings {
    /// Image folder
    pub folder: String,
    /// Seconds between changes
    pub interval: u64,
    /// Fit style passed through to the helper
    pub style: String,
    pub shuffle: bool,
    pub recursive: bool,
    /// Set one wallpaper and exit
    pub once: bool,
}

impl Default for WallpaperSettings {
    fn default() -> Self {
        Self {
            folder: String::new(),
            interval: 300,
            style: "fill".to_string(),
            shuffle: true,
            recursive: false,
            once: false,
        }
    }
}

impl WallpaperSettings {
    /// Shell command line that launches the helper with these options
    pub fn command_line(&self) -> String {
        if cfg!(windows) {
            self.command_line_with("start \"\" pythonw.exe")
        } else {
            self.command_line_with("python3")
        }
    }

    fn command_line_with(&self, launcher: &str) -> String {
        let mut line = format!(
            "{} {} \"{}\" --interval {} --style {}",
            launcher,
            HELPER_SCRIPT,
            self.folder,
            self.interval.max(1),
            self.style
        );
        for (flag, on) in [
            ("--shuffle", self.shuffle),
            ("--recursive", self.recursive),
            ("--once", self.once),
        ] {
            if on {
                line.push(' ');
                line.push_str(flag);
            }
        }
        line
    }

    /// Give helper descriptors without a command the generated one
    pub fn fill_commands(&self, apps: &mut [AppDescriptor]) {
        for app in apps.iter_mut().filter(|app| is_helper(app)) {
            if let LaunchKind::Script { command, .. } = &mut app.launch {
                if command.trim().is_empty() {
                    *command = self.command_line();
                }
            }
        }
    }

    /// Inverse of [`fill_commands`](Self::fill_commands): generated commands
    /// are not written back, so settings edits take effect on next load
    pub fn strip_commands(&self, apps: &mut [AppDescriptor]) {
        let generated = self.command_line();
        for app in apps.iter_mut().filter(|app| is_helper(app)) {
            if let LaunchKind::Script { command, .. } = &mut app.launch {
                if *command == generated {
                    command.clear();
                }
            }
        }
    }
}

pub fn is_helper(app: &AppDescriptor) -> bool {
    app.fingerprint()
        .is_some_and(|script| script.eq_ignore_ascii_case(HELPER_SCRIPT))
}

/// Send a command, reporting rather than returning a failure
pub fn send_or_warn(helper: &WallpaperHelper, command: WallpaperCommand) {
    if let Err(e) = helper.send(command) {
        warn!("Failed to send '{}' to wallpaper helper: {}", command.as_str(), e);
    }
}
