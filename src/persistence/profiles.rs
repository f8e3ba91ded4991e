//! Profile store - Named partial desired-state overlays

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use super::json_store::{load_or_default, write_atomic};
use crate::core::profile::{Profile, ProfileError};

/// Owner of the profiles file: `{profile: {app: bool}}`
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    profiles: BTreeMap<String, BTreeMap<String, bool>>,
}

impl ProfileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw: BTreeMap<String, Value> = load_or_default(&path);
        Self {
            profiles: normalize(raw),
            path,
        }
    }

    /// Re-read the file, keeping nothing from memory
    pub fn reload(&mut self) {
        let raw: BTreeMap<String, Value> = load_or_default(&self.path);
        self.profiles = normalize(raw);
    }

    pub fn get(&self, name: &str) -> Option<Profile> {
        self.profiles.get(name).map(|entries| Profile {
            name: name.to_string(),
            entries: entries.clone(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Create or fully replace a profile
    pub fn save(&mut self, profile: Profile) -> Result<(), ProfileError> {
        let name = valid_name(&profile.name)?;
        info!("Saving profile '{}' ({} entries)", name, profile.entries.len());
        self.profiles.insert(name, profile.entries);
        self.persist();
        Ok(())
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), ProfileError> {
        let new = valid_name(new)?;
        if old == new {
            return Ok(());
        }
        if self.profiles.contains_key(&new) {
            return Err(ProfileError::Duplicate(new));
        }
        let entries = self
            .profiles
            .remove(old)
            .ok_or_else(|| ProfileError::NotFound(old.to_string()))?;
        self.profiles.insert(new, entries);
        self.persist();
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<(), ProfileError> {
        self.profiles
            .remove(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        self.persist();
        Ok(())
    }

    /// Follow an application rename into every profile that mentions it
    pub fn rename_app(&mut self, old: &str, new: &str) {
        let mut changed = false;
        for entries in self.profiles.values_mut() {
            if let Some(value) = entries.remove(old) {
                entries.insert(new.to_string(), value);
                changed = true;
            }
        }
        if changed {
            self.persist();
        }
    }

    /// Drop a removed application from every profile
    pub fn forget_app(&mut self, name: &str) {
        let mut changed = false;
        for entries in self.profiles.values_mut() {
            changed |= entries.remove(name).is_some();
        }
        if changed {
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = write_atomic(&self.path, &self.profiles) {
            warn!("Failed to save profiles to {}: {}", self.path.display(), e);
        }
    }
}

fn valid_name(name: &str) -> Result<String, ProfileError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProfileError::InvalidName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Coerce hand-edited values to booleans; non-object profiles are dropped
fn normalize(raw: BTreeMap<String, Value>) -> BTreeMap<String, BTreeMap<String, bool>> {
    raw.into_iter()
        .filter_map(|(name, mapping)| match mapping {
            Value::Object(entries) => Some((
                name,
                entries
                    .into_iter()
                    .map(|(app, value)| (app, truthy(&value)))
                    .collect(),
            )),
            other => {
                warn!("Ignoring profile '{}': expected an object, found {}", name, other);
                None
            }
        })
        .collect()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
