//! Core module - Managed applications, process matching, and the supervisor

pub mod app;
mod app_state;
pub mod intent;
pub mod matcher;
mod monitor;
pub mod process;
pub mod profile;
pub mod resource;
pub mod settings;
pub mod snapshot;
pub mod wallpaper;

#[cfg(test)]
pub(crate) mod test_utils;

pub use app_state::{AppError, AppStatus, Supervisor, SupervisorError, TickReport};
pub use intent::{Intent, Overview};
pub use monitor::SystemProcesses;
pub use settings::{DataPaths, Settings, APP_NAME};
