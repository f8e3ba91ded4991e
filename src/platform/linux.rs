//! XDG desktops - Autostart through `~/.config/autostart`

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::core::settings::APP_NAME;

fn entry_path() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Failed to get config directory")?
        .join("autostart")
        .join("appkeeper.desktop"))
}

fn desktop_entry(exec: &str) -> String {
    format!(
        "[Desktop Entry]\nType=Application\nName={}\nExec=\"{}\"\nX-GNOME-Autostart-enabled=true\nNoDisplay=true\n",
        APP_NAME, exec
    )
}

pub fn set_launch_at_login(enabled: bool) -> Result<()> {
    let path = entry_path()?;

    if !enabled {
        match std::fs::remove_file(&path) {
            Ok(()) => info!("Removed autostart entry {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("Failed to remove autostart entry"),
        }
        return Ok(());
    }

    let exe = super::current_executable()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, desktop_entry(&exe.display().to_string()))
        .context("Failed to write autostart entry")?;
    info!("Installed autostart entry {}", path.display());
    Ok(())
}

pub fn launch_at_login_enabled() -> Result<bool> {
    Ok(entry_path()?.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_entry_quotes_exec() {
        let entry = desktop_entry("/opt/app keeper/appkeeper");
        assert!(entry.starts_with("[Desktop Entry]\n"));
        assert!(entry.contains("Exec=\"/opt/app keeper/appkeeper\"\n"));
        assert!(entry.contains("Name=AppKeeper\n"));
    }
}
