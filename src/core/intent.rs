//! Intents and the display model exchanged with the presentation layer

use std::collections::BTreeMap;

use super::app::AppDescriptor;
use super::resource::ResourceUsage;
use super::wallpaper::{WallpaperCommand, WallpaperStatus};

/// A user request, posted from any thread and applied on the supervisor's
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Toggle(String),
    SetDesired { app: String, run: bool },
    /// `None` clears the last-applied profile
    ApplyProfile(Option<String>),
    ToggleAutostart,
    SetAutostart(bool),
    Wallpaper(WallpaperCommand),
    AddApp(AppDescriptor),
    /// Replace the application called `name`, possibly renaming it
    UpdateApp { name: String, app: AppDescriptor },
    RemoveApp(String),
    MoveApp { name: String, position: usize },
    /// Create or fully replace a profile
    SaveProfile { name: String, entries: BTreeMap<String, bool> },
    RenameProfile { old: String, new: String },
    DeleteProfile(String),
    /// Re-read apps and profiles from disk
    ReloadConfig,
    OpenLogs,
    Quit,
}

/// One managed application as currently observed
#[derive(Debug, Clone, PartialEq)]
pub struct AppView {
    pub name: String,
    pub desired: bool,
    pub running: bool,
    pub pid: Option<u32>,
    pub usage: Option<ResourceUsage>,
    /// Whether this is the wallpaper helper
    pub wallpaper: bool,
}

impl AppView {
    /// "CPU: x% | Mem: y" while running, empty otherwise
    pub fn stats(&self) -> String {
        match (&self.usage, self.running) {
            (Some(usage), true) => usage.summary(),
            _ => String::new(),
        }
    }
}

/// Everything the tray needs to draw itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overview {
    pub apps: Vec<AppView>,
    pub autostart: bool,
    pub last_profile: Option<String>,
    pub profiles: Vec<String>,
    pub wallpaper: WallpaperStatus,
}
