//! macOS-specific implementations

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::{info, warn};

const AGENT_LABEL: &str = "com.appkeeper.agent";

fn agent_path() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to get home directory")?
        .join("Library")
        .join("LaunchAgents")
        .join(format!("{}.plist", AGENT_LABEL)))
}

/// Install or remove our launch agent
pub fn set_launch_at_login(enabled: bool) -> Result<()> {
    let plist_path = agent_path()?;

    if !enabled {
        if plist_path.exists() {
            let unload = Command::new("launchctl")
                .arg("unload")
                .arg(&plist_path)
                .output();
            if let Err(e) = unload {
                warn!("launchctl unload failed: {}", e);
            }
            std::fs::remove_file(&plist_path).context("Failed to remove launch agent")?;
            info!("Removed launch agent {}", plist_path.display());
        }
        return Ok(());
    }

    let exe = super::current_executable()?;
    if let Some(dir) = plist_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let plist_content = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
</dict>
</plist>"#,
        AGENT_LABEL,
        exe.display()
    );

    std::fs::write(&plist_path, plist_content).context("Failed to write launch agent")?;

    Command::new("launchctl")
        .arg("load")
        .arg(&plist_path)
        .output()
        .context("Failed to load launch agent")?;

    info!("Installed launch agent {}", plist_path.display());
    Ok(())
}

pub fn launch_at_login_enabled() -> Result<bool> {
    Ok(agent_path()?.exists())
}
