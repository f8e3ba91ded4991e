//! User interface module - Tray icon and configuration watcher

pub mod tray;
pub mod watcher;
