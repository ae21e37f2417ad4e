//! Artifact storage: upload handles, droplets and staging URIs

pub mod digest;
pub mod local;
pub mod uris;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::errors::StagerError;
use crate::filesys::file::File;

pub use self::local::LocalArtifactStore;
pub use self::uris::StagingUris;

/// Storage for app bits and droplets
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Acquire the exclusive upload slot of an app.
    ///
    /// Waits while another staging attempt holds the slot for the same app.
    async fn acquire_upload_handle(&self, app_id: &str) -> Result<UploadHandle, StagerError>;

    /// Move an uploaded droplet into durable storage
    async fn store_droplet(&self, app_id: &str, upload_path: &Path) -> Result<(), StagerError>;

    /// Delete the stored droplet, returning whether one existed
    async fn delete_droplet(&self, app_id: &str) -> Result<bool, StagerError>;

    /// Path of the stored droplet, if any
    async fn droplet_path(&self, app_id: &str) -> Result<Option<PathBuf>, StagerError>;

    /// Path of the uploaded app bits, if any
    async fn app_bits_path(&self, app_id: &str) -> Result<Option<PathBuf>, StagerError>;

    /// Where a worker's droplet upload must be written, while a handle is held
    fn pending_upload_path(&self, app_id: &str) -> Option<PathBuf>;

    /// URI a worker downloads the app bits from
    fn app_uri(&self, app_id: &str) -> String;

    /// URI a worker uploads the droplet to
    fn droplet_upload_uri(&self, app_id: &str) -> String;
}

/// Scoped upload slot for one staging attempt.
///
/// Dropping the handle releases the slot; the release hook runs exactly once.
pub struct UploadHandle {
    app_id: String,
    expected_path: PathBuf,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl UploadHandle {
    pub fn new(
        app_id: impl Into<String>,
        expected_path: impl Into<PathBuf>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            expected_path: expected_path.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Where the worker's upload is expected
    pub fn expected_path(&self) -> &Path {
        &self.expected_path
    }

    /// The uploaded droplet, once the worker has delivered it
    pub async fn upload_path(&self) -> Option<PathBuf> {
        match tokio::fs::metadata(&self.expected_path).await {
            Ok(meta) if meta.is_file() => Some(self.expected_path.clone()),
            _ => None,
        }
    }

    /// Remove any leftover upload, then release the slot
    pub async fn release(self) {
        if let Err(e) = File::new(self.expected_path.clone()).delete().await {
            warn!(
                "Failed to remove upload {}: {}",
                self.expected_path.display(),
                e
            );
        }
    }
}

impl Drop for UploadHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle")
            .field("app_id", &self.app_id)
            .field("expected_path", &self.expected_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_release_runs_once_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        let handle = UploadHandle::new("app-1", "/nonexistent/upload", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.upload_path().await.is_none());
        drop(handle);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
