//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::StagerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the stager
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Application records, one JSON file per app
    pub fn apps_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("apps"))
    }

    /// Uploaded application bits served to staging workers
    pub fn bits_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("bits"))
    }

    /// Droplets uploaded by workers while a staging attempt is in flight
    pub fn uploads_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("uploads"))
    }

    /// Durable droplet storage
    pub fn droplets_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("droplets"))
    }

    /// Staging task logs
    pub fn task_logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("task_logs"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), StagerError> {
        self.apps_dir().create().await?;
        self.bits_dir().create().await?;
        self.uploads_dir().create().await?;
        self.droplets_dir().create().await?;
        self.task_logs_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/app-stager");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".app-stager");

        Self::new(base_dir)
    }
}
