//! Managed applications - Identity and launch recipe of every supervised program

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or editing the managed application list
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Application #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("Application '{0}' is declared more than once")]
    DuplicateName(String),
    #[error("Application '{0}' has no process name to match")]
    MissingProcessName(String),
    #[error("Application '{0}' has neither a path nor a command to launch")]
    NoLaunchTarget(String),
    #[error("Application '{0}' is a script but names no script file")]
    MissingScript(String),
    #[error("Failed to read application list: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse application list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How an application is launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchKind {
    /// A program started directly, without a shell.
    /// `command` is used through the shell when `path` does not exist.
    Executable {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// A shell command line
    Shell { command: String },
    /// A script run by an interpreter, recognised by its file name in the
    /// interpreter's arguments
    Script {
        #[serde(default)]
        command: String,
        script: String,
    },
}

/// Resolved launch recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchTarget<'a> {
    Direct { path: &'a Path, args: &'a [String] },
    Shell(&'a str),
}

impl std::fmt::Display for LaunchTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { path, .. } => write!(f, "{}", path.display()),
            Self::Shell(command) => write!(f, "{}", command),
        }
    }
}

/// A managed application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// Unique display and reference key
    pub name: String,
    /// Executable name of the live process, compared case-insensitively
    pub process_name: String,
    #[serde(flatten)]
    pub launch: LaunchKind,
    /// Working directory for shell launches; relative paths resolve
    /// against the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl AppDescriptor {
    pub fn executable(
        name: impl Into<String>,
        process_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            process_name: process_name.into(),
            launch: LaunchKind::Executable {
                path: path.into(),
                args: Vec::new(),
                command: None,
            },
            cwd: None,
        }
    }

    pub fn shell(
        name: impl Into<String>,
        process_name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            process_name: process_name.into(),
            launch: LaunchKind::Shell {
                command: command.into(),
            },
            cwd: None,
        }
    }

    pub fn script(
        name: impl Into<String>,
        process_name: impl Into<String>,
        command: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            process_name: process_name.into(),
            launch: LaunchKind::Script {
                command: command.into(),
                script: script.into(),
            },
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Substring that must appear in the live process's arguments
    pub fn fingerprint(&self) -> Option<&str> {
        match &self.launch {
            LaunchKind::Script { script, .. } => Some(script.as_str()),
            _ => None,
        }
    }

    /// Pick what to run: an existing executable directly, else a shell command
    pub fn launch_target(&self) -> Option<LaunchTarget<'_>> {
        match &self.launch {
            LaunchKind::Executable {
                path,
                args,
                command,
            } => {
                if !path.as_os_str().is_empty() && path.is_file() {
                    Some(LaunchTarget::Direct { path, args })
                } else {
                    non_empty(command.as_deref()).map(LaunchTarget::Shell)
                }
            }
            LaunchKind::Shell { command } | LaunchKind::Script { command, .. } => {
                non_empty(Some(command)).map(LaunchTarget::Shell)
            }
        }
    }

    /// Working directory resolved against `base`
    pub fn working_directory(&self, base: &Path) -> Option<PathBuf> {
        let cwd = self.cwd.as_ref()?;
        if cwd.as_os_str().is_empty() || cwd == Path::new(".") {
            Some(base.to_path_buf())
        } else if cwd.is_relative() {
            Some(base.join(cwd))
        } else {
            Some(cwd.clone())
        }
    }

    /// Check the structural invariants of a single record
    pub fn validate(&self, index: usize) -> Result<(), DescriptorError> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::EmptyName { index });
        }
        if self.process_name.trim().is_empty() {
            return Err(DescriptorError::MissingProcessName(self.name.clone()));
        }
        let has_target = match &self.launch {
            LaunchKind::Executable { path, command, .. } => {
                !path.as_os_str().is_empty() || non_empty(command.as_deref()).is_some()
            }
            LaunchKind::Shell { command } => non_empty(Some(command)).is_some(),
            LaunchKind::Script { command, script } => {
                if script.trim().is_empty() {
                    return Err(DescriptorError::MissingScript(self.name.clone()));
                }
                non_empty(Some(command)).is_some()
            }
        };
        if !has_target {
            return Err(DescriptorError::NoLaunchTarget(self.name.clone()));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse an application list without validating it
pub fn parse_descriptors(json: &str) -> Result<Vec<AppDescriptor>, DescriptorError> {
    Ok(serde_json::from_str(json)?)
}

/// Validate every record and the uniqueness of names
pub fn validate_all(apps: &[AppDescriptor]) -> Result<(), DescriptorError> {
    let mut seen = HashSet::new();
    for (index, app) in apps.iter().enumerate() {
        app.validate(index)?;
        if !seen.insert(app.name.as_str()) {
            return Err(DescriptorError::DuplicateName(app.name.clone()));
        }
    }
    Ok(())
}
