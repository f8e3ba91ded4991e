//! AppKeeper - Keep a declared set of desktop applications running or stopped
//!
//! A tray-resident supervisor that reconciles each managed application
//! against the live process table on a fixed tick, restarts the ones that
//! are wanted but gone, and applies named profiles without touching the
//! applications they do not mention.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
#![allow(dead_code)] // Some supervisor accessors are only used by tests or by one platform

mod core;
mod persistence;
mod platform;
mod ui;

use anyhow::{Context, Result};
use single_instance::SingleInstance;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{DataPaths, Overview, Settings, Supervisor, SystemProcesses, APP_NAME};
use crate::platform::SystemLaunchAtLogin;

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let paths = DataPaths::resolve();
    std::fs::create_dir_all(paths.root())
        .with_context(|| format!("Failed to create data directory {}", paths.root().display()))?;
    let settings = Settings::load(&paths);

    // Initialize logging
    let _log_guard = init_logging(&paths, &settings)?;

    info!("{} v{} starting...", APP_NAME, APP_VERSION);
    info!("Data directory: {}", paths.root().display());

    // Ensure only one supervisor runs per user
    let instance = SingleInstance::new(APP_NAME).context("Failed to create single instance lock")?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(paths, settings))?;

    info!("{} shutting down", APP_NAME);
    Ok(())
}

async fn run(paths: DataPaths, settings: Settings) -> Result<()> {
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (overview_tx, overview_rx) = watch::channel(Overview::default());

    let mut supervisor = Supervisor::new(
        SystemProcesses::new(),
        paths.clone(),
        settings.clone(),
        Box::new(SystemLaunchAtLogin),
    );

    let watcher = settings
        .watch_config
        .then(|| ui::watcher::spawn_config_watcher(&paths, intent_tx.clone()));

    #[cfg(windows)]
    let _tray = match ui::tray::spawn_tray(intent_tx.clone(), overview_rx, paths.icon_file()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Running without a tray icon: {:#}", e);
            None
        }
    };
    #[cfg(not(windows))]
    drop(overview_rx);

    // Held until the supervisor returns so the intent channel stays open
    // even when no tray or watcher is posting
    let _intents = intent_tx;

    supervisor.run(intent_rx, overview_tx).await;

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    Ok(())
}

/// Initialize the logging system: console plus a daily file in the logs directory
fn init_logging(paths: &DataPaths, settings: &Settings) -> Result<WorkerGuard> {
    let default_filter = if settings.debug_logging {
        "appkeeper=debug"
    } else {
        "appkeeper=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("appkeeper")
        .filename_suffix("log")
        .build(paths.logs_dir())
        .context("Failed to create log file")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}
