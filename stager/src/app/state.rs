//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::artifacts::{LocalArtifactStore, StagingUris};
use crate::channel::{EventPump, LoopbackChannel, MessageChannel, MqttChannel, Topics};
use crate::errors::StagerError;
use crate::filesys::dir::Dir;
use crate::staging::stager::AppStager;
use crate::staging::task_log::FileTaskLogStore;
use crate::storage::apps::FileAppRepository;

/// Main application state
pub struct AppState {
    /// Staging orchestrator
    pub stager: Arc<AppStager>,

    /// Local artifact store backing the stager
    pub artifacts: Arc<LocalArtifactStore>,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Returns the event pump to run when a message bus is configured.
    pub async fn init(options: &AppOptions) -> Result<(Self, Option<EventPump>), StagerError> {
        info!("Initializing application state...");

        let layout = &options.storage.layout;
        layout.setup().await?;

        let droplets_dir = options
            .storage
            .droplets_dir
            .clone()
            .map(Dir::new)
            .unwrap_or_else(|| layout.droplets_dir());
        let task_logs_dir = options
            .storage
            .task_logs_dir
            .clone()
            .map(Dir::new)
            .unwrap_or_else(|| layout.task_logs_dir());
        task_logs_dir.create().await?;

        let uris = StagingUris::new(
            &options.external.base_url,
            options.external.user.as_deref(),
            options.external.password.as_ref(),
        )?;
        let artifacts = Arc::new(LocalArtifactStore::new(
            layout.bits_dir(),
            layout.uploads_dir(),
            droplets_dir,
            uris,
        ));
        artifacts.setup().await?;

        let (channel, pump): (Arc<dyn MessageChannel>, Option<EventPump>) =
            if options.message_bus.address.host.is_empty() {
                warn!("Message bus host not configured, using the in-process channel");
                (Arc::new(LoopbackChannel::new()), None)
            } else {
                let (channel, pump) = MqttChannel::connect(
                    &options.message_bus.address,
                    Topics::new(options.message_bus.topic_prefix.as_str()),
                )?;
                (Arc::new(channel), Some(pump))
            };

        let stager = Arc::new(AppStager::new(
            options.staging.clone(),
            channel,
            artifacts.clone(),
            Arc::new(FileTaskLogStore::new(task_logs_dir)),
            Arc::new(FileAppRepository::new(layout.apps_dir())),
        ));

        Ok((Self { stager, artifacts }, pump))
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), StagerError> {
        let stats = self.artifacts.stats();
        info!(
            "Shutting down application state ({} upload handles acquired, {} released)...",
            stats.acquired(),
            stats.released()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::layout::StorageLayout;

    #[tokio::test]
    async fn test_init_without_message_bus() {
        let tmp = tempfile::tempdir().unwrap();
        let options = AppOptions {
            storage: crate::app::options::StorageOptions {
                layout: StorageLayout::new(tmp.path()),
                ..Default::default()
            },
            ..Default::default()
        };

        let (state, pump) = AppState::init(&options).await.unwrap();
        assert!(pump.is_none());
        assert!(tmp.path().join("droplets").is_dir());
        assert!(tmp.path().join("task_logs").is_dir());
        assert_eq!(
            state.stager.artifacts().app_uri("app-1"),
            "http://127.0.0.1:9022/staging/apps/app-1"
        );
        state.shutdown().await.unwrap();
    }
}
