//! Config watcher - Reload apps and profiles edited by other programs

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{DataPaths, Intent};

/// Quiet period after the first change before a reload is requested
pub const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

/// Files whose edits trigger a reload
fn watched_files(paths: &DataPaths) -> Vec<OsString> {
    [paths.apps_file(), paths.profiles_file(), paths.wallpaper_file()]
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
        .collect()
}

fn is_relevant(event: &Event, files: &[OsString]) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .filter_map(|p| p.file_name())
        .any(|name| files.iter().any(|f| f == name))
}

/// Watch the data directory and post `Intent::ReloadConfig` after edits.
/// Our own writes trigger it too; reloading an unchanged list is a no-op.
pub fn spawn_config_watcher(paths: &DataPaths, intents: mpsc::UnboundedSender<Intent>) -> JoinHandle<()> {
    let dir: PathBuf = paths.root().to_path_buf();
    let files = watched_files(paths);

    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel(256);
        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.blocking_send(event);
            }
            Err(e) => warn!("Config watcher error: {}", e),
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!("Failed to create config watcher: {}", e);
                return;
            }
        };

        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!("Failed to watch {}: {}", dir.display(), e);
            return;
        }
        info!("Watching {} for configuration changes", dir.display());

        while let Some(first) = rx.recv().await {
            let mut relevant = is_relevant(&first, &files);

            tokio::time::sleep(DEBOUNCE_DURATION).await;
            while let Ok(event) = rx.try_recv() {
                relevant |= is_relevant(&event, &files);
            }

            if !relevant {
                continue;
            }
            debug!("Configuration changed on disk");
            if intents.send(Intent::ReloadConfig).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_only_config_files_are_relevant() {
        let paths = DataPaths::new("/data");
        let files = watched_files(&paths);

        let edit = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(paths.apps_file());
        assert!(is_relevant(&edit, &files));

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(paths.profiles_file());
        assert!(is_relevant(&created, &files));

        let temp = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/data/state.json"));
        assert!(!is_relevant(&temp, &files));

        let read = Event::new(EventKind::Access(AccessKind::Any)).add_path(paths.apps_file());
        assert!(!is_relevant(&read, &files));
    }
}
