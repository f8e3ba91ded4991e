//! Desired state - The user's declared on/off intent per application

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::json_store::{load_or_default, write_atomic};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredState {
    /// Whether each application should be running
    pub desired: BTreeMap<String, bool>,
    /// Launch the supervisor at login
    pub autostart: bool,
    /// Most recently applied profile
    #[serde(rename = "lastProfile", alias = "last_profile")]
    pub last_profile: Option<String>,
}

impl DesiredState {
    pub fn wants(&self, name: &str) -> bool {
        self.desired.get(name).copied().unwrap_or(false)
    }
}

/// Owner of the desired-state file. Every mutation is written through.
#[derive(Debug)]
pub struct DesiredStateStore {
    path: PathBuf,
    state: DesiredState,
}

impl DesiredStateStore {
    /// Load the file, or start empty if it is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_or_default(&path);
        Self { path, state }
    }

    pub fn state(&self) -> &DesiredState {
        &self.state
    }

    /// Mutate the state and persist it. A failed write is reported and the
    /// in-memory state is kept.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut DesiredState) -> R) -> R {
        let result = f(&mut self.state);
        self.persist();
        result
    }

    pub fn replace(&mut self, state: DesiredState) {
        self.state = state;
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = write_atomic(&self.path, &self.state) {
            warn!("Failed to save desired state to {}: {}", self.path.display(), e);
        }
    }
}
