//! Managed application list file

use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use super::json_store::write_atomic;
use crate::core::app::{parse_descriptors, validate_all, AppDescriptor, DescriptorError};
use crate::core::wallpaper::WallpaperSettings;

/// The ordered application list, `apps.json`
#[derive(Debug, Clone)]
pub struct AppsFile {
    path: PathBuf,
}

impl AppsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the list. A missing file is an empty list.
    /// The wallpaper helper's command is generated from `helper`.
    pub fn load(&self, helper: &WallpaperSettings) -> Result<Vec<AppDescriptor>, DescriptorError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No application list at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut apps = parse_descriptors(&json)?;
        helper.fill_commands(&mut apps);
        validate_all(&apps)?;
        Ok(apps)
    }

    pub fn save(&self, apps: &[AppDescriptor], helper: &WallpaperSettings) -> io::Result<()> {
        let mut apps = apps.to_vec();
        helper.strip_commands(&mut apps);
        write_atomic(&self.path, &apps)
    }
}
