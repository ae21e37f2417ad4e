//! Staging orchestrator
//!
//! [`AppStager`] is the explicitly constructed context every staging call
//! goes through. Nothing here is process global.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use staging_wire::StagingRequest;
use tracing::{debug, error, info, warn};

use crate::artifacts::digest::{file_digest, DigestAlgorithm};
use crate::artifacts::{ArtifactStore, UploadHandle};
use crate::channel::MessageChannel;
use crate::errors::StagerError;
use crate::models::app::App;
use crate::staging::async_response::AsyncResponse;
use crate::staging::bridge::StagingBridge;
use crate::staging::outcome::StagingOutcome;
use crate::staging::request::build_staging_request;
use crate::staging::task_log::{StagingTaskLog, TaskLogStore};
use crate::storage::apps::AppRepository;
use crate::storage::settings::StagingSettings;

/// Staging protocol configuration
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Queue of synchronous staging requests
    pub queue: String,

    /// Queue of asynchronous staging requests
    pub async_queue: String,

    /// Wait bound of a synchronous staging call
    pub max_staging_runtime: Duration,

    /// Wait bound for the single async reply
    pub async_request_timeout: Duration,

    /// Droplet digest
    pub digest: DigestAlgorithm,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self::from(&StagingSettings::default())
    }
}

impl From<&StagingSettings> for StagingConfig {
    fn from(settings: &StagingSettings) -> Self {
        Self {
            queue: settings.queue.clone(),
            async_queue: settings.async_queue.clone(),
            max_staging_runtime: Duration::from_secs(settings.max_staging_runtime),
            async_request_timeout: Duration::from_secs(settings.async_request_timeout),
            digest: settings.digest,
        }
    }
}

fn staging_failure(detail: impl Display) -> StagerError {
    StagerError::StagingError(format!("failed to stage application:\n{}", detail))
}

pub struct AppStager {
    config: StagingConfig,
    bridge: StagingBridge,
    channel: Arc<dyn MessageChannel>,
    artifacts: Arc<dyn ArtifactStore>,
    task_logs: Arc<dyn TaskLogStore>,
    apps: Arc<dyn AppRepository>,
}

impl AppStager {
    pub fn new(
        config: StagingConfig,
        channel: Arc<dyn MessageChannel>,
        artifacts: Arc<dyn ArtifactStore>,
        task_logs: Arc<dyn TaskLogStore>,
        apps: Arc<dyn AppRepository>,
    ) -> Self {
        Self {
            config,
            bridge: StagingBridge::new(channel.clone()),
            channel,
            artifacts,
            task_logs,
            apps,
        }
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub fn task_logs(&self) -> &Arc<dyn TaskLogStore> {
        &self.task_logs
    }

    /// Load an app record, failing with `NotFound` when it does not exist
    pub async fn find_app(&self, guid: &str) -> Result<App, StagerError> {
        self.apps
            .find(guid)
            .await?
            .ok_or_else(|| StagerError::NotFound(format!("app {}", guid)))
    }

    /// The request a worker would receive for `app`
    pub fn staging_request(&self, app: &App) -> Result<StagingRequest, StagerError> {
        build_staging_request(app, self.artifacts.as_ref())
    }

    /// Stage `app` and register its droplet.
    ///
    /// Every failure is reported as `StagingError`. The upload handle is
    /// released on all paths. No retries.
    pub async fn stage(&self, app: &mut App) -> Result<(), StagerError> {
        debug!("staging {}", app.guid);

        self.stage_with_handle(app).await.map_err(|e| match e {
            StagerError::StagingError(_) => e,
            other => staging_failure(other),
        })?;

        info!("staging for {} complete", app.guid);
        Ok(())
    }

    /// [`stage`](Self::stage) for callers on a plain thread.
    ///
    /// Blocks the current thread on `runtime` while the channel keeps
    /// running on the runtime's own workers. Must not be called from
    /// inside an async task.
    pub fn stage_blocking(
        &self,
        runtime: &tokio::runtime::Handle,
        app: &mut App,
    ) -> Result<(), StagerError> {
        runtime.block_on(self.stage(app))
    }

    async fn stage_with_handle(&self, app: &mut App) -> Result<(), StagerError> {
        let handle = self.artifacts.acquire_upload_handle(&app.guid).await?;
        let staged = self.stage_holding(&handle, app).await;
        handle.release().await;
        staged
    }

    async fn stage_holding(
        &self,
        handle: &UploadHandle,
        app: &mut App,
    ) -> Result<(), StagerError> {
        let request = self.staging_request(app)?;
        debug!(
            "staging {} request: {}",
            app.guid,
            serde_json::to_string(&request)?
        );

        let outcome = self
            .bridge
            .call(&self.config.queue, &request, self.config.max_staging_runtime)
            .await;

        let task_log = match outcome {
            StagingOutcome::Success(task_log) => task_log,
            StagingOutcome::RemoteError(message) => {
                error!("staging {} error: {}", app.guid, message);
                return Err(staging_failure(message));
            }
            StagingOutcome::NoResponse => {
                error!(
                    "staging {} got no response within {:?}",
                    app.guid, self.config.max_staging_runtime
                );
                return Err(staging_failure(format!(
                    "no staging response within {:?}",
                    self.config.max_staging_runtime
                )));
            }
        };
        debug!("staging {} complete, task log is {} bytes", app.guid, task_log.len());

        self.task_logs
            .put(&StagingTaskLog::new(&app.guid, &task_log))
            .await?;

        let Some(upload_path) = handle.upload_path().await else {
            warn!("staging {} reported success without a droplet", app.guid);
            return Err(staging_failure(format!("no droplet uploaded\n{}", task_log)));
        };

        let droplet_hash = file_digest(&upload_path, self.config.digest).await?;
        self.artifacts.store_droplet(&app.guid, &upload_path).await?;

        app.droplet_hash = Some(droplet_hash);
        self.apps.save(app).await?;
        Ok(())
    }

    /// Ask a worker to stage `app` in the background.
    ///
    /// Waits only for the worker's acknowledgement. A reply carrying an
    /// error, or no reply at all, is an `AsyncError`.
    pub async fn stage_async(&self, app: &App) -> Result<AsyncResponse, StagerError> {
        let request = self.staging_request(app)?;
        let payload = serde_json::to_vec(&request)?;

        let replies = self
            .channel
            .request(
                &self.config.async_queue,
                payload,
                1,
                self.config.async_request_timeout,
            )
            .await?;

        let response = AsyncResponse::from_reply(replies.first().map(Vec::as_slice))?;
        if let Some(ref error) = response.error {
            warn!("async staging {} failed: {}", app.guid, error);
            return Err(StagerError::AsyncError(error.clone()));
        }

        info!(
            "async staging {} accepted as task {}",
            app.guid,
            response.task_id.as_deref().unwrap_or("-")
        );
        Ok(response)
    }

    /// Remove the stored droplet of `app`
    pub async fn delete_droplet(&self, app: &App) -> Result<bool, StagerError> {
        self.artifacts.delete_droplet(&app.guid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{LocalArtifactStore, StagingUris};
    use crate::channel::LoopbackChannel;
    use crate::filesys::dir::Dir;
    use crate::staging::task_log::InMemoryTaskLogStore;
    use crate::storage::apps::InMemoryAppRepository;

    struct Fixture {
        _tmp: tempfile::TempDir,
        channel: Arc<LoopbackChannel>,
        artifacts: Arc<LocalArtifactStore>,
        stager: AppStager,
    }

    fn fixture(config: StagingConfig) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let channel = Arc::new(LoopbackChannel::new());
        let artifacts = Arc::new(LocalArtifactStore::new(
            Dir::new(tmp.path().join("bits")),
            Dir::new(tmp.path().join("uploads")),
            Dir::new(tmp.path().join("droplets")),
            StagingUris::new("http://stager.local", None, None).unwrap(),
        ));
        let stager = AppStager::new(
            config,
            channel.clone(),
            artifacts.clone(),
            Arc::new(InMemoryTaskLogStore::new()),
            Arc::new(InMemoryAppRepository::new()),
        );
        Fixture {
            _tmp: tmp,
            channel,
            artifacts,
            stager,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = StagingConfig::default();
        assert_eq!(config.queue, "staging");
        assert_eq!(config.async_queue, "staging.async");
        assert_eq!(config.max_staging_runtime, Duration::from_secs(120));
        assert_eq!(config.digest, DigestAlgorithm::Sha1);
    }

    #[tokio::test]
    async fn test_invalid_app_is_staging_error() {
        let fixture = fixture(StagingConfig::default());
        let mut app = App::new("app-1", "web");

        let err = fixture.stager.stage(&mut app).await.unwrap_err();
        match err {
            StagerError::StagingError(msg) => {
                assert!(msg.starts_with("failed to stage application:\n"));
                assert!(msg.contains("has no framework"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(fixture.artifacts.stats().released(), 1);
    }

    #[tokio::test]
    async fn test_missing_app() {
        let fixture = fixture(StagingConfig::default());
        assert!(matches!(
            fixture.stager.find_app("nope").await,
            Err(StagerError::NotFound(_))
        ));
    }

    #[test]
    fn test_stage_blocking_without_worker_times_out() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let fixture = fixture(StagingConfig {
            max_staging_runtime: Duration::from_millis(50),
            ..StagingConfig::default()
        });
        let _rx = fixture.channel.subscribe("staging");

        let mut app = App::new("app-1", "web");
        app.framework = Some(crate::models::app::Framework {
            name: "ruby19".to_string(),
            internal_info: serde_json::Value::Null,
        });

        let err = fixture
            .stager
            .stage_blocking(runtime.handle(), &mut app)
            .unwrap_err();
        assert!(err.to_string().contains("no staging response"));
        assert!(app.droplet_hash.is_none());
        assert_eq!(fixture.artifacts.stats().released(), 1);
    }
}
