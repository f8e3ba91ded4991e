//! Profile management - Named, partial desired-state overlays

use std::collections::BTreeMap;

use thiserror::Error;

use super::app::AppDescriptor;
use crate::persistence::DesiredState;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile '{0}' does not exist")]
    NotFound(String),
    #[error("Invalid profile name '{0}'")]
    InvalidName(String),
    #[error("A profile named '{0}' already exists")]
    Duplicate(String),
}

/// A named set of on/off intents. Applications it does not mention are
/// left alone when it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub entries: BTreeMap<String, bool>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn with(mut self, app: impl Into<String>, run: bool) -> Self {
        self.entries.insert(app.into(), run);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileAction {
    Start,
    Stop,
}

/// Outcome of applying a profile: the new desired state and the process
/// actions needed to reach it, in application order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePlan {
    pub desired: DesiredState,
    pub actions: Vec<(String, ProfileAction)>,
}

pub struct ProfileEngine;

impl ProfileEngine {
    /// Overlay `profile` on `current`.
    ///
    /// Only managed applications named by the profile change; an action is
    /// planned where the wanted state differs from `is_running`. An empty
    /// profile changes nothing, not even the last-applied marker.
    pub fn apply(
        profile: &Profile,
        apps: &[AppDescriptor],
        current: &DesiredState,
        is_running: impl Fn(&str) -> bool,
    ) -> ProfilePlan {
        let mut desired = current.clone();
        let mut actions = Vec::new();

        if profile.entries.is_empty() {
            return ProfilePlan { desired, actions };
        }

        for app in apps {
            let Some(&want) = profile.entries.get(&app.name) else {
                continue;
            };
            desired.desired.insert(app.name.clone(), want);
            match (want, is_running(&app.name)) {
                (true, false) => actions.push((app.name.clone(), ProfileAction::Start)),
                (false, true) => actions.push((app.name.clone(), ProfileAction::Stop)),
                _ => {}
            }
        }

        desired.last_profile = Some(profile.name.clone());
        ProfilePlan { desired, actions }
    }

    /// Forget the last-applied profile; nothing else changes
    pub fn clear(current: &DesiredState) -> DesiredState {
        DesiredState {
            last_profile: None,
            ..current.clone()
        }
    }
}
