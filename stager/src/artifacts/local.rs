//! Directory-backed artifact store

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactStore, StagingUris, UploadHandle};
use crate::errors::StagerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::utils::ensure_path_safe;

/// Upload handle counters
#[derive(Debug, Default)]
pub struct HandleStats {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl HandleStats {
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

/// Artifact store keeping bits, pending uploads and droplets on local disk
pub struct LocalArtifactStore {
    bits_dir: Dir,
    uploads_dir: Dir,
    droplets_dir: Dir,
    uris: StagingUris,
    slots: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    pending: Arc<Mutex<HashMap<String, PathBuf>>>,
    stats: Arc<HandleStats>,
}

impl LocalArtifactStore {
    pub fn new(bits_dir: Dir, uploads_dir: Dir, droplets_dir: Dir, uris: StagingUris) -> Self {
        Self {
            bits_dir,
            uploads_dir,
            droplets_dir,
            uris,
            slots: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(HandleStats::default()),
        }
    }

    /// Upload handle counters
    pub fn stats(&self) -> &HandleStats {
        &self.stats
    }

    /// Create the storage directories
    pub async fn setup(&self) -> Result<(), StagerError> {
        self.bits_dir.create().await?;
        self.uploads_dir.create().await?;
        self.droplets_dir.create().await?;
        Ok(())
    }

    fn slot(&self, app_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(app_id.to_string()).or_default().clone()
    }

    fn droplet_file(&self, app_id: &str) -> File {
        self.droplets_dir.file(app_id)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn acquire_upload_handle(&self, app_id: &str) -> Result<UploadHandle, StagerError> {
        ensure_path_safe(app_id)?;

        let slot = self.slot(app_id);
        let guard = slot.clone().lock_owned().await;

        self.uploads_dir.create().await?;
        let upload_file = self.uploads_dir.file(&format!("{}.droplet", app_id));
        if upload_file.delete().await? {
            warn!("Removed stale droplet upload for {}", app_id);
        }

        let expected_path = upload_file.path().to_path_buf();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(app_id.to_string(), expected_path.clone());
        }
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        debug!("Acquired upload handle for {}", app_id);

        let slots = self.slots.clone();
        let pending = self.pending.clone();
        let stats = self.stats.clone();
        let owner = app_id.to_string();
        let cleanup_path = expected_path.clone();

        Ok(UploadHandle::new(app_id, expected_path, move || {
            if let Err(e) = std::fs::remove_file(&cleanup_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove upload {}: {}", cleanup_path.display(), e);
                }
            }
            pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&owner);
            stats.released.fetch_add(1, Ordering::SeqCst);
            debug!("Released upload handle for {}", owner);
            drop(guard);

            // clones are only made under the map lock, so a count of two
            // (the map and this hook) means nobody is waiting
            let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
            if Arc::strong_count(&slot) == 2 {
                slots.remove(&owner);
            }
        }))
    }

    async fn store_droplet(&self, app_id: &str, upload_path: &Path) -> Result<(), StagerError> {
        ensure_path_safe(app_id)?;
        let target = self.droplet_file(app_id);
        File::new(upload_path).move_to(&target).await?;
        info!("Stored droplet for {} at {}", app_id, target.path().display());
        Ok(())
    }

    async fn delete_droplet(&self, app_id: &str) -> Result<bool, StagerError> {
        ensure_path_safe(app_id)?;
        let deleted = self.droplet_file(app_id).delete().await?;
        if deleted {
            info!("Deleted droplet for {}", app_id);
        }
        Ok(deleted)
    }

    async fn droplet_path(&self, app_id: &str) -> Result<Option<PathBuf>, StagerError> {
        ensure_path_safe(app_id)?;
        let file = self.droplet_file(app_id);
        Ok(file.exists().await.then(|| file.path().to_path_buf()))
    }

    async fn app_bits_path(&self, app_id: &str) -> Result<Option<PathBuf>, StagerError> {
        ensure_path_safe(app_id)?;
        let file = self.bits_dir.file(&format!("{}.zip", app_id));
        Ok(file.exists().await.then(|| file.path().to_path_buf()))
    }

    fn pending_upload_path(&self, app_id: &str) -> Option<PathBuf> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.get(app_id).cloned()
    }

    fn app_uri(&self, app_id: &str) -> String {
        self.uris.app_uri(app_id)
    }

    fn droplet_upload_uri(&self, app_id: &str) -> String {
        self.uris.droplet_upload_uri(app_id)
    }
}
