//! Windows-specific implementations

use anyhow::{Context, Result};
use std::io::ErrorKind;
use tracing::info;
use winreg::enums::{HKEY_CURRENT_USER, KEY_READ};
use winreg::RegKey;

use crate::core::settings::APP_NAME;

const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";

/// Add or remove our value under the per-user Run key
pub fn set_launch_at_login(enabled: bool) -> Result<()> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (run, _) = hkcu
        .create_subkey(RUN_KEY)
        .context("Failed to open the Run registry key")?;

    if enabled {
        let exe = super::current_executable()?;
        let command = format!("\"{}\"", exe.display());
        run.set_value(APP_NAME, &command)
            .context("Failed to write the Run registry value")?;
        info!("Registered launch at login: {}", command);
    } else {
        match run.delete_value(APP_NAME) {
            Ok(()) => info!("Removed launch at login"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("Failed to delete the Run registry value"),
        }
    }
    Ok(())
}

pub fn launch_at_login_enabled() -> Result<bool> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let run = match hkcu.open_subkey_with_flags(RUN_KEY, KEY_READ) {
        Ok(key) => key,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).context("Failed to open the Run registry key"),
    };
    match run.get_value::<String, _>(APP_NAME) {
        Ok(value) => Ok(!value.is_empty()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context("Failed to read the Run registry value"),
    }
}
