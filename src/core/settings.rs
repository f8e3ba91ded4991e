//! Application settings management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::persistence::load_or_default;

/// Fixed application identifier
pub const APP_NAME: &str = "AppKeeper";

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "APPKEEPER_HOME";

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Reconciliation
    /// Period of the reconciliation tick in ms
    pub tick_interval_ms: u64,
    /// How long descendants get to exit before being killed, in ms
    pub child_grace_ms: u64,
    /// How long the target process gets to exit before being killed, in ms
    pub target_grace_ms: u64,
    /// Executable-name substrings marking a script interpreter
    pub interpreter_markers: Vec<String>,

    // Logging
    /// Lines kept in each per-application log
    pub log_lines: usize,
    /// Enable debug logging
    pub debug_logging: bool,

    // Integration
    /// Reload apps/profiles when other programs edit them
    pub watch_config: bool,
    /// Ask the wallpaper helper to quit when the supervisor exits
    pub quit_wallpaper_on_exit: bool,
    /// Helper command file (default: `<data>/wallch.cmd`)
    pub wallpaper_command_file: Option<PathBuf>,
    /// Helper status file (default: `<data>/wallch.status`)
    pub wallpaper_status_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Reconciliation
            tick_interval_ms: 2500,
            child_grace_ms: 500,
            target_grace_ms: 1000,
            interpreter_markers: vec!["python".to_string()],

            // Logging
            log_lines: 50,
            debug_logging: false,

            // Integration
            watch_config: true,
            quit_wallpaper_on_exit: true,
            wallpaper_command_file: None,
            wallpaper_status_file: None,
        }
    }
}

impl Settings {
    /// Load `settings.json` from the data directory, or defaults
    pub fn load(paths: &DataPaths) -> Self {
        let mut settings: Settings = load_or_default(&paths.settings_file());
        settings.validate();
        settings
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.max(250);
        self.log_lines = self.log_lines.max(1);
        self.interpreter_markers.retain(|m| !m.trim().is_empty());
        if self.interpreter_markers.is_empty() {
            self.interpreter_markers = Self::default().interpreter_markers;
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn child_grace(&self) -> Duration {
        Duration::from_millis(self.child_grace_ms)
    }

    pub fn target_grace(&self) -> Duration {
        Duration::from_millis(self.target_grace_ms)
    }
}

/// Locations of every file the supervisor reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$APPKEEPER_HOME`, else the per-user data directory
    pub fn resolve() -> Self {
        match std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            Some(home) => Self::new(home),
            None => Self::new(
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(APP_NAME),
            ),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn apps_file(&self) -> PathBuf {
        self.root.join("apps.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.root.join("profiles.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn wallpaper_file(&self) -> PathBuf {
        self.root.join("wallpaper.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn icon_file(&self) -> PathBuf {
        self.root.join("icon.png")
    }

    pub fn wallpaper_command_file(&self, settings: &Settings) -> PathBuf {
        settings
            .wallpaper_command_file
            .clone()
            .unwrap_or_else(|| self.root.join("wallch.cmd"))
    }

    pub fn wallpaper_status_file(&self, settings: &Settings) -> PathBuf {
        settings
            .wallpaper_status_file
            .clone()
            .unwrap_or_else(|| self.root.join("wallch.status"))
    }
}
