//! Application state - The supervisor that keeps managed applications in their desired state

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::app::{AppDescriptor, DescriptorError};
use super::intent::{AppView, Intent, Overview};
use super::matcher::ProcessMatcher;
use super::process::{Launcher, StartError, StartOutcome, StopError, TreeTerminator};
use super::profile::{Profile, ProfileAction, ProfileEngine, ProfileError};
use super::settings::{DataPaths, Settings};
use super::snapshot::{LiveProcessHandle, ProcessSnapshot, ProcessTable};
use super::wallpaper::{self, WallpaperCommand, WallpaperHelper, WallpaperSettings, WallpaperStatus};
use crate::persistence::{
    load_or_default, AppLog, AppsFile, DesiredState, DesiredStateStore, LogEvent, ProfileStore,
};
use crate::platform::LaunchAtLogin;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No managed application named '{0}'")]
    NotFound(String),
    #[error("An application named '{0}' already exists")]
    Duplicate(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Stop(#[from] StopError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    App(#[from] AppError),
}

/// What the supervisor last observed about an application
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppStatus {
    #[default]
    Unknown,
    Running(LiveProcessHandle),
    Stopped,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Applications relaunched because they were wanted but not running
    pub restarted: Vec<String>,
}

/// Owns every piece of mutable state. Ticks and intents run one at a time
/// on the same thread; nothing here is shared.
pub struct Supervisor<T: ProcessTable> {
    /// The OS process table
    table: T,
    matcher: ProcessMatcher,
    launcher: Launcher,
    terminator: TreeTerminator,
    /// Managed applications, in display order
    apps: Vec<AppDescriptor>,
    apps_file: AppsFile,
    /// `apps.json` failed to load; it is backed up before being overwritten
    apps_unreadable: bool,
    /// Last observation per application name
    statuses: HashMap<String, AppStatus>,
    state: DesiredStateStore,
    profiles: ProfileStore,
    log: AppLog,
    wallpaper: WallpaperHelper,
    wallpaper_settings: WallpaperSettings,
    login: Box<dyn LaunchAtLogin>,
    settings: Settings,
    paths: DataPaths,
}

impl<T: ProcessTable> Supervisor<T> {
    /// Load every store from `paths`. Nothing here fails: unreadable files
    /// fall back to empty state and are reported.
    pub fn new(table: T, paths: DataPaths, settings: Settings, login: Box<dyn LaunchAtLogin>) -> Self {
        if let Err(e) = std::fs::create_dir_all(paths.root()) {
            warn!("Failed to create data directory {}: {}", paths.root().display(), e);
        }

        let wallpaper_settings: WallpaperSettings = load_or_default(&paths.wallpaper_file());
        let apps_file = AppsFile::new(paths.apps_file());
        let (apps, apps_unreadable) = match apps_file.load(&wallpaper_settings) {
            Ok(apps) => (apps, false),
            Err(e) => {
                error!("Invalid application list, starting with none: {}", e);
                (Vec::new(), true)
            }
        };
        info!("Loaded {} managed applications", apps.len());

        Self {
            matcher: ProcessMatcher::new(table.own_pid(), &settings.interpreter_markers),
            launcher: Launcher::new(paths.root()),
            terminator: TreeTerminator::new(settings.child_grace(), settings.target_grace()),
            table,
            apps,
            apps_file,
            apps_unreadable,
            statuses: HashMap::new(),
            state: DesiredStateStore::open(paths.state_file()),
            profiles: ProfileStore::open(paths.profiles_file()),
            log: AppLog::new(paths.logs_dir(), settings.log_lines),
            wallpaper: WallpaperHelper::new(
                paths.wallpaper_command_file(&settings),
                paths.wallpaper_status_file(&settings),
            ),
            wallpaper_settings,
            login,
            settings,
            paths,
        }
    }

    pub fn apps(&self) -> &[AppDescriptor] {
        &self.apps
    }

    pub fn desired_state(&self) -> &DesiredState {
        self.state.state()
    }

    pub fn status(&self, name: &str) -> AppStatus {
        self.statuses.get(name).cloned().unwrap_or_default()
    }

    pub fn is_running(&self, name: &str) -> bool {
        matches!(self.statuses.get(name), Some(AppStatus::Running(_)))
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.names()
    }

    pub fn profile(&self, name: &str) -> Option<Profile> {
        self.profiles.get(name)
    }

    /// Startup: align launch-at-login with the stored preference, then
    /// reconcile once
    pub fn seed(&mut self) -> TickReport {
        let want = self.state.state().autostart;
        match self.login.is_enabled() {
            Ok(actual) if actual != want => {
                info!("Launch at login is {}, restoring {}", actual, want);
                if let Err(e) = self.login.set_enabled(want) {
                    warn!("Failed to update launch at login: {:#}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to query launch at login: {:#}", e),
        }

        let wanted = self.apps.iter().filter(|a| self.state.state().wants(&a.name)).count();
        info!("Seeding: {} of {} applications wanted running", wanted, self.apps.len());
        self.tick()
    }

    /// Observe every application and relaunch the ones that are wanted but
    /// gone. At most one full process snapshot is taken.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let mut snapshot: Option<ProcessSnapshot> = None;

        for app in &self.apps {
            let previous = self.statuses.get(&app.name);
            let mut observed = None;

            if let Some(AppStatus::Running(handle)) = previous {
                match self.table.probe(handle.pid) {
                    Some(current) if self.matcher.is_same_app(app, &current) => observed = Some(current),
                    Some(current) => debug!(
                        "PID {} now belongs to {}, re-resolving '{}'",
                        current.pid, current.name, app.name
                    ),
                    None => debug!("'{}' (PID {}) has exited", app.name, handle.pid),
                }
            }

            let was_running = matches!(previous, Some(AppStatus::Running(_)));
            if observed.is_none() {
                let snap = snapshot.get_or_insert_with(|| self.table.snapshot());
                observed = self.matcher.find(app, snap);
                if let Some(found) = &observed {
                    if !was_running {
                        info!("'{}' is running (PID {})", app.name, found.pid);
                    }
                }
            }

            match observed {
                Some(handle) => {
                    self.statuses.insert(app.name.clone(), AppStatus::Running(handle));
                }
                None => {
                    if was_running {
                        info!("'{}' is no longer running", app.name);
                    }
                    self.statuses.insert(app.name.clone(), AppStatus::Stopped);

                    if !self.state.state().wants(&app.name) {
                        continue;
                    }
                    let snap = snapshot.get_or_insert_with(|| self.table.snapshot());
                    match self.launcher.start(&mut self.table, &self.matcher, app, snap, &self.log) {
                        Ok(outcome) => {
                            info!("Auto-restarted '{}' ({:?})", app.name, outcome);
                            self.log.append(&app.name, &LogEvent::AutoRestart);
                            report.restarted.push(app.name.clone());
                        }
                        Err(e) => warn!("Auto-restart failed: {}", e),
                    }
                }
            }
        }

        report
    }

    /// Flip an application based on whether it is observed running
    pub fn toggle(&mut self, name: &str) -> Result<(), SupervisorError> {
        let run = !self.is_running(name);
        self.set_desired(name, run)
    }

    /// Explicit on/off. The desire is recorded even if acting on it fails,
    /// so a failed start is retried by the next tick.
    pub fn set_desired(&mut self, name: &str, run: bool) -> Result<(), SupervisorError> {
        let index = self.index_of(name)?;
        let name = self.apps[index].name.clone();

        let result = if run {
            self.state.update(|s| s.desired.insert(name.clone(), true));
            let result = self.start_app(index);
            self.log.append(&name, &LogEvent::ToggledOn);
            result
        } else {
            let result = self.stop_app(index);
            self.state.update(|s| s.desired.insert(name.clone(), false));
            self.log.append(&name, &LogEvent::ToggledOff);
            result
        };

        info!("'{}' toggled {}", name, if run { "ON" } else { "OFF" });
        result
    }

    /// Apply a profile, or with `None` forget the last-applied one.
    /// Every planned action is attempted; the last failure is returned.
    pub fn apply_profile(&mut self, name: Option<&str>) -> Result<(), SupervisorError> {
        let Some(name) = name else {
            info!("Clearing active profile");
            let cleared = ProfileEngine::clear(self.state.state());
            self.state.replace(cleared);
            return Ok(());
        };

        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        let plan = ProfileEngine::apply(&profile, &self.apps, self.state.state(), |app| {
            self.is_running(app)
        });
        info!("Applying profile '{}': {} actions", profile.name, plan.actions.len());
        self.state.replace(plan.desired);

        let mut result = Ok(());
        for (app, action) in plan.actions {
            let Ok(index) = self.index_of(&app) else {
                continue;
            };
            let (outcome, event) = match action {
                ProfileAction::Start => (self.start_app(index), LogEvent::ProfileStart(profile.name.clone())),
                ProfileAction::Stop => (self.stop_app(index), LogEvent::ProfileStop(profile.name.clone())),
            };
            self.log.append(&app, &event);
            if let Err(e) = outcome {
                warn!("Profile '{}' could not reach '{}': {}", profile.name, app, e);
                result = Err(e);
            }
        }
        result
    }

    pub fn set_autostart(&mut self, enabled: bool) {
        self.state.update(|s| s.autostart = enabled);
        match self.login.set_enabled(enabled) {
            Ok(()) => info!("Launch at login {}", if enabled { "enabled" } else { "disabled" }),
            Err(e) => warn!("Failed to update launch at login: {:#}", e),
        }
    }

    pub fn toggle_autostart(&mut self) {
        let enabled = !self.state.state().autostart;
        self.set_autostart(enabled);
    }

    /// Create or fully replace a profile
    pub fn save_profile(&mut self, name: &str, entries: BTreeMap<String, bool>) -> Result<(), SupervisorError> {
        self.profiles.save(Profile {
            name: name.to_string(),
            entries,
        })?;
        Ok(())
    }

    pub fn rename_profile(&mut self, old: &str, new: &str) -> Result<(), SupervisorError> {
        self.profiles.rename(old, new)?;
        if self.state.state().last_profile.as_deref() == Some(old) {
            let new = new.trim().to_string();
            self.state.update(|s| s.last_profile = Some(new));
        }
        Ok(())
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<(), SupervisorError> {
        self.profiles.delete(name)?;
        if self.state.state().last_profile.as_deref() == Some(name) {
            self.state.update(|s| s.last_profile = None);
        }
        Ok(())
    }

    /// Append a new application
    pub fn add_app(&mut self, app: AppDescriptor) -> Result<(), SupervisorError> {
        app.validate(self.apps.len()).map_err(AppError::from)?;
        if self.apps.iter().any(|a| a.name == app.name) {
            return Err(AppError::Duplicate(app.name).into());
        }
        info!("Adding application '{}'", app.name);
        self.apps.push(app);
        self.save_apps();
        Ok(())
    }

    /// Replace the application called `name`; renaming carries its desired
    /// state and profile entries along
    pub fn update_app(&mut self, name: &str, app: AppDescriptor) -> Result<(), SupervisorError> {
        let index = self.index_of(name)?;
        app.validate(index).map_err(AppError::from)?;
        if app.name != name && self.apps.iter().any(|a| a.name == app.name) {
            return Err(AppError::Duplicate(app.name).into());
        }

        if app.name != name {
            info!("Renaming application '{}' to '{}'", name, app.name);
            let new = app.name.clone();
            self.state.update(|s| {
                if let Some(want) = s.desired.remove(name) {
                    s.desired.insert(new, want);
                }
            });
            self.profiles.rename_app(name, &app.name);
            if let Some(status) = self.statuses.remove(name) {
                self.statuses.insert(app.name.clone(), status);
            }
        }

        self.apps[index] = app;
        self.save_apps();
        Ok(())
    }

    /// Forget an application. A running instance is left alone.
    pub fn remove_app(&mut self, name: &str) -> Result<(), SupervisorError> {
        let index = self.index_of(name)?;
        let app = self.apps.remove(index);
        info!("Removing application '{}'", app.name);
        self.statuses.remove(&app.name);
        self.state.update(|s| s.desired.remove(&app.name));
        self.profiles.forget_app(&app.name);
        self.save_apps();
        Ok(())
    }

    /// Move an application to `position` in display order
    pub fn move_app(&mut self, name: &str, position: usize) -> Result<(), SupervisorError> {
        let index = self.index_of(name)?;
        let app = self.apps.remove(index);
        let position = position.min(self.apps.len());
        self.apps.insert(position, app);
        self.save_apps();
        Ok(())
    }

    /// Re-read apps and profiles edited by other programs. An invalid
    /// application list keeps the current one.
    pub fn reload_config(&mut self) {
        self.wallpaper_settings = load_or_default(&self.paths.wallpaper_file());
        let loaded = self.apps_file.load(&self.wallpaper_settings);
        if loaded.is_ok() {
            self.apps_unreadable = false;
        }
        match loaded {
            Ok(apps) if apps != self.apps => {
                info!("Application list changed on disk ({} applications)", apps.len());
                self.statuses.retain(|name, _| apps.iter().any(|a| &a.name == name));
                self.apps = apps;
            }
            Ok(_) => debug!("Application list unchanged"),
            Err(e) => warn!("Keeping current application list: {}", e),
        }
        self.profiles.reload();
    }

    pub fn wallpaper(&self, command: WallpaperCommand) {
        wallpaper::send_or_warn(&self.wallpaper, command);
    }

    /// Display model for the presentation layer
    pub fn overview(&self) -> Overview {
        let state = self.state.state();
        let apps: Vec<AppView> = self
            .apps
            .iter()
            .map(|app| {
                let pid = match self.statuses.get(&app.name) {
                    Some(AppStatus::Running(handle)) => Some(handle.pid),
                    _ => None,
                };
                AppView {
                    name: app.name.clone(),
                    desired: state.wants(&app.name),
                    running: pid.is_some(),
                    pid,
                    usage: pid.and_then(|pid| self.table.usage(pid)),
                    wallpaper: wallpaper::is_helper(app),
                }
            })
            .collect();

        let wallpaper = match apps.iter().find(|a| a.wallpaper) {
            Some(helper) if helper.running => self.wallpaper.status(),
            Some(_) => WallpaperStatus::Stopped,
            None => WallpaperStatus::Unknown,
        };

        Overview {
            apps,
            autostart: state.autostart,
            last_profile: state.last_profile.clone(),
            profiles: self.profiles.names(),
            wallpaper,
        }
    }

    /// Apply one intent; `false` means the supervisor should exit
    pub fn handle(&mut self, intent: Intent) -> bool {
        debug!("Handling {:?}", intent);
        let result = match intent {
            Intent::Toggle(name) => self.toggle(&name),
            Intent::SetDesired { app, run } => self.set_desired(&app, run),
            Intent::ApplyProfile(name) => self.apply_profile(name.as_deref()),
            Intent::ToggleAutostart => {
                self.toggle_autostart();
                Ok(())
            }
            Intent::SetAutostart(enabled) => {
                self.set_autostart(enabled);
                Ok(())
            }
            Intent::Wallpaper(command) => {
                self.wallpaper(command);
                Ok(())
            }
            Intent::AddApp(app) => self.add_app(app),
            Intent::UpdateApp { name, app } => self.update_app(&name, app),
            Intent::RemoveApp(name) => self.remove_app(&name),
            Intent::MoveApp { name, position } => self.move_app(&name, position),
            Intent::SaveProfile { name, entries } => self.save_profile(&name, entries),
            Intent::RenameProfile { old, new } => self.rename_profile(&old, &new),
            Intent::DeleteProfile(name) => self.delete_profile(&name),
            Intent::ReloadConfig => {
                self.reload_config();
                Ok(())
            }
            Intent::OpenLogs => {
                self.open_logs();
                Ok(())
            }
            Intent::Quit => return false,
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
        true
    }

    /// Drive the supervisor: seed, then tick on a fixed period and apply
    /// intents as they arrive, publishing an overview after each.
    /// Returns on `Intent::Quit`, Ctrl-C or when every sender is gone.
    pub async fn run(&mut self, mut intents: mpsc::UnboundedReceiver<Intent>, overview: watch::Sender<Overview>) {
        self.seed();
        overview.send_replace(self.overview());

        let period = self.settings.tick_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut listen_for_signal = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick();
                    if !report.restarted.is_empty() {
                        info!("Restarted: {}", report.restarted.join(", "));
                    }
                }
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        if !self.handle(intent) {
                            info!("Quit requested");
                            break;
                        }
                    }
                    None => {
                        info!("All intent senders closed");
                        break;
                    }
                },
                signal = &mut ctrl_c, if listen_for_signal => match signal {
                    Ok(()) => {
                        info!("Interrupted");
                        break;
                    }
                    Err(e) => {
                        warn!("Cannot listen for Ctrl-C: {}", e);
                        listen_for_signal = false;
                    }
                },
            }
            overview.send_replace(self.overview());
        }

        self.shutdown();
    }

    /// Tell the wallpaper helper to quit if it is ours and running
    pub fn shutdown(&mut self) {
        if !self.settings.quit_wallpaper_on_exit {
            return;
        }
        let helper_running = self
            .apps
            .iter()
            .any(|app| wallpaper::is_helper(app) && self.is_running(&app.name));
        if helper_running {
            info!("Asking wallpaper helper to quit");
            self.wallpaper(WallpaperCommand::Quit);
        }
    }

    fn open_logs(&self) {
        let dir = self.log.dir();
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create logs directory: {}", e);
        }
        if let Err(e) = open::that(dir) {
            warn!("Failed to open {}: {}", dir.display(), e);
        }
    }

    fn index_of(&self, name: &str) -> Result<usize, AppError> {
        self.apps
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))
    }

    fn start_app(&mut self, index: usize) -> Result<(), SupervisorError> {
        let snapshot = self.table.snapshot();
        let app = &self.apps[index];
        let outcome = self
            .launcher
            .start(&mut self.table, &self.matcher, app, &snapshot, &self.log)?;

        let status = match outcome {
            StartOutcome::AlreadyRunning(pid) => self
                .table
                .probe(pid)
                .map(AppStatus::Running)
                .unwrap_or(AppStatus::Unknown),
            // Resolved by the next tick; the spawned pid may be a launcher shell
            StartOutcome::Spawned(_) => AppStatus::Unknown,
        };
        self.statuses.insert(app.name.clone(), status);
        Ok(())
    }

    fn stop_app(&mut self, index: usize) -> Result<(), SupervisorError> {
        let app = &self.apps[index];
        let cached = match self.statuses.get(&app.name) {
            Some(AppStatus::Running(handle)) => Some(handle.clone()),
            _ => None,
        };
        let result = self
            .terminator
            .stop(&mut self.table, &self.matcher, app, cached.as_ref(), &self.log);
        self.statuses.insert(app.name.clone(), AppStatus::Stopped);
        result?;
        Ok(())
    }

    fn save_apps(&mut self) {
        if self.apps_unreadable {
            let backup = backup_path(self.apps_file.path());
            if let Err(e) = std::fs::copy(self.apps_file.path(), &backup) {
                warn!(
                    "Not saving application list: failed to back up unreadable {}: {}",
                    self.apps_file.path().display(),
                    e
                );
                return;
            }
            warn!("Unreadable application list kept as {}", backup.display());
            self.apps_unreadable = false;
        }
        if let Err(e) = self.apps_file.save(&self.apps, &self.wallpaper_settings) {
            warn!("Failed to save application list: {}", e);
        }
    }
}

/// `apps.json` -> `apps.json.bak`
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}
