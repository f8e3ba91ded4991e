//! Persistence layer - JSON stores and per-application logs

mod app_log;
mod apps;
mod json_store;
mod profiles;
mod state;

pub use app_log::{AppLog, LogEvent};
pub use apps::AppsFile;
pub use json_store::{load_or_default, write_atomic};
pub use profiles::ProfileStore;
pub use state::{DesiredState, DesiredStateStore};
