//! Platform-specific launch-at-login for Windows, macOS and other Unix desktops

#[cfg(windows)]
pub mod windows;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(all(unix, not(target_os = "macos")))]
pub mod linux;

use anyhow::Result;

/// Per-user "start the supervisor at login" switch
pub trait LaunchAtLogin {
    fn is_enabled(&self) -> Result<bool>;
    fn set_enabled(&self, enabled: bool) -> Result<()>;
}

/// The operating system's own autorun mechanism
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLaunchAtLogin;

impl LaunchAtLogin for SystemLaunchAtLogin {
    fn is_enabled(&self) -> Result<bool> {
        launch_at_login_enabled()
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        set_launch_at_login(enabled)
    }
}

/// Register or unregister the current executable to run at login
pub fn set_launch_at_login(enabled: bool) -> Result<()> {
    #[cfg(windows)]
    {
        windows::set_launch_at_login(enabled)
    }
    #[cfg(target_os = "macos")]
    {
        macos::set_launch_at_login(enabled)
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        linux::set_launch_at_login(enabled)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = enabled;
        anyhow::bail!("Unsupported platform")
    }
}

/// Whether the current user has launch-at-login registered
pub fn launch_at_login_enabled() -> Result<bool> {
    #[cfg(windows)]
    {
        windows::launch_at_login_enabled()
    }
    #[cfg(target_os = "macos")]
    {
        macos::launch_at_login_enabled()
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        linux::launch_at_login_enabled()
    }
    #[cfg(not(any(windows, unix)))]
    {
        Ok(false)
    }
}

/// Absolute path of the running executable
fn current_executable() -> Result<std::path::PathBuf> {
    use anyhow::Context;
    std::env::current_exe().context("Failed to locate the running executable")
}
