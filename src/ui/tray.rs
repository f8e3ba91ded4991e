//! System tray - Menu of managed applications and profiles
//!
//! The tray runs on its own thread with its own message loop. Menu clicks
//! become [`Intent`]s posted to the supervisor; the menu is rebuilt from
//! each published [`Overview`].

use crate::core::wallpaper::WallpaperCommand;
use crate::core::Intent;

const TOGGLE_PREFIX: &str = "toggle:";
const PROFILE_PREFIX: &str = "profile:";
const CLEAR_PROFILE_ID: &str = "profile-clear";
const WALLPAPER_TOGGLE_ID: &str = "wallpaper-toggle";
const WALLPAPER_NEXT_ID: &str = "wallpaper-next";
const AUTOSTART_ID: &str = "autostart";
const OPEN_LOGS_ID: &str = "open-logs";
const QUIT_ID: &str = "quit";

#[cfg_attr(not(windows), allow(dead_code))]
fn toggle_id(app: &str) -> String {
    format!("{}{}", TOGGLE_PREFIX, app)
}

#[cfg_attr(not(windows), allow(dead_code))]
fn profile_id(profile: &str) -> String {
    format!("{}{}", PROFILE_PREFIX, profile)
}

/// Translate a clicked menu id into the request it stands for
pub fn intent_for(menu_id: &str) -> Option<Intent> {
    if let Some(app) = menu_id.strip_prefix(TOGGLE_PREFIX) {
        return Some(Intent::Toggle(app.to_string()));
    }
    if let Some(profile) = menu_id.strip_prefix(PROFILE_PREFIX) {
        return Some(Intent::ApplyProfile(Some(profile.to_string())));
    }
    match menu_id {
        CLEAR_PROFILE_ID => Some(Intent::ApplyProfile(None)),
        WALLPAPER_TOGGLE_ID => Some(Intent::Wallpaper(WallpaperCommand::Toggle)),
        WALLPAPER_NEXT_ID => Some(Intent::Wallpaper(WallpaperCommand::Next)),
        AUTOSTART_ID => Some(Intent::ToggleAutostart),
        OPEN_LOGS_ID => Some(Intent::OpenLogs),
        QUIT_ID => Some(Intent::Quit),
        _ => None,
    }
}

#[cfg(windows)]
pub use self::windows_tray::spawn_tray;

#[cfg(windows)]
mod windows_tray {
    use std::path::{Path, PathBuf};
    use std::thread::JoinHandle;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use tokio::sync::{mpsc, watch};
    use tracing::{debug, error, info, warn};
    use tray_icon::menu::{CheckMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem, Submenu};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};
    use windows::Win32::UI::WindowsAndMessaging::{DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE};

    use super::*;
    use crate::core::wallpaper::WallpaperStatus;
    use crate::core::{Overview, APP_NAME};

    /// How often the tray thread looks for clicks and overview changes
    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Start the tray thread. It exits after posting `Quit` or once the
    /// supervisor stops listening.
    pub fn spawn_tray(
        intents: mpsc::UnboundedSender<Intent>,
        overview: watch::Receiver<Overview>,
        icon_path: PathBuf,
    ) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("tray".to_string())
            .spawn(move || {
                if let Err(e) = run_tray(intents, overview, &icon_path) {
                    error!("Tray icon failed: {:#}", e);
                }
            })
            .context("Failed to spawn tray thread")
    }

    fn run_tray(
        intents: mpsc::UnboundedSender<Intent>,
        mut overview: watch::Receiver<Overview>,
        icon_path: &Path,
    ) -> Result<()> {
        let current = overview.borrow_and_update().clone();
        let tray: TrayIcon = TrayIconBuilder::new()
            .with_menu(Box::new(build_menu(&current)?))
            .with_icon(load_icon(icon_path)?)
            .with_tooltip(APP_NAME)
            .build()
            .context("Failed to build tray icon")?;
        info!("System tray icon created");

        let menu_events = MenuEvent::receiver();
        loop {
            pump_messages();

            while let Ok(event) = menu_events.try_recv() {
                let Some(intent) = intent_for(event.id.0.as_str()) else {
                    debug!("Ignoring menu event {:?}", event.id);
                    continue;
                };
                let quit = intent == Intent::Quit;
                if intents.send(intent).is_err() || quit {
                    return Ok(());
                }
            }

            match overview.has_changed() {
                Ok(true) => {
                    let current = overview.borrow_and_update().clone();
                    match build_menu(&current) {
                        Ok(menu) => tray.set_menu(Some(Box::new(menu))),
                        Err(e) => warn!("Failed to rebuild tray menu: {:#}", e),
                    }
                }
                Ok(false) => {}
                // Supervisor is gone
                Err(_) => return Ok(()),
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn pump_messages() {
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn build_menu(overview: &Overview) -> Result<Menu> {
        let menu = Menu::new();

        for app in &overview.apps {
            let label = match app.stats() {
                stats if stats.is_empty() => app.name.clone(),
                stats => format!("{}  ({})", app.name, stats),
            };
            let item = CheckMenuItem::with_id(toggle_id(&app.name), label, true, app.running, None);
            menu.append(&item).context("Failed to add application item")?;
        }
        if !overview.apps.is_empty() {
            menu.append(&PredefinedMenuItem::separator())?;
        }

        let profiles = Submenu::new("Profiles", !overview.profiles.is_empty());
        for name in &overview.profiles {
            let active = overview.last_profile.as_deref() == Some(name.as_str());
            let item = CheckMenuItem::with_id(profile_id(name), name, true, active, None);
            profiles.append(&item).context("Failed to add profile item")?;
        }
        profiles.append(&PredefinedMenuItem::separator())?;
        profiles.append(&MenuItem::with_id(
            CLEAR_PROFILE_ID,
            "Clear profile",
            overview.last_profile.is_some(),
            None,
        ))?;
        menu.append(&profiles)?;

        if overview.apps.iter().any(|a| a.wallpaper) {
            let playing = overview.wallpaper == WallpaperStatus::Playing;
            let running = overview.wallpaper != WallpaperStatus::Stopped;
            let label = if playing { "Wallpaper: Pause" } else { "Wallpaper: Play" };
            menu.append(&MenuItem::with_id(WALLPAPER_TOGGLE_ID, label, running, None))?;
            menu.append(&MenuItem::with_id(WALLPAPER_NEXT_ID, "Wallpaper: Next", running, None))?;
        }

        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&CheckMenuItem::with_id(
            AUTOSTART_ID,
            "Start on Boot",
            true,
            overview.autostart,
            None,
        ))?;
        menu.append(&MenuItem::with_id(OPEN_LOGS_ID, "Open logs", true, None))?;
        menu.append(&MenuItem::with_id(QUIT_ID, "Quit", true, None))?;
        Ok(menu)
    }

    /// `icon.png` from the data directory, or a generated badge
    fn load_icon(path: &Path) -> Result<Icon> {
        match image::open(path) {
            Ok(img) => {
                let rgba = img.into_rgba8();
                let (width, height) = rgba.dimensions();
                Icon::from_rgba(rgba.into_raw(), width, height).context("Invalid tray icon image")
            }
            Err(e) => {
                debug!("No usable icon at {} ({}), using default", path.display(), e);
                default_icon()
            }
        }
    }

    fn default_icon() -> Result<Icon> {
        const SIZE: usize = 32;
        let mut rgba = vec![0u8; SIZE * SIZE * 4];

        for y in 0..SIZE {
            for x in 0..SIZE {
                let idx = (y * SIZE + x) * 4;
                let cx = x as f32 - SIZE as f32 / 2.0;
                let cy = y as f32 - SIZE as f32 / 2.0;
                let dist = (cx * cx + cy * cy).sqrt();

                if dist < SIZE as f32 / 2.0 - 1.0 {
                    let t = dist / (SIZE as f32 / 2.0);
                    rgba[idx] = (37.0 + t * 30.0) as u8;
                    rgba[idx + 1] = (99.0 - t * 35.0) as u8;
                    rgba[idx + 2] = (235.0 - t * 60.0) as u8;
                    rgba[idx + 3] = 255;
                }
            }
        }

        Icon::from_rgba(rgba, SIZE as u32, SIZE as u32).context("Failed to create default icon")
    }
}
