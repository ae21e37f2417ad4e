#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use app_stager::artifacts::{ArtifactStore, LocalArtifactStore, StagingUris};
use app_stager::channel::{InboundRequest, LoopbackChannel};
use app_stager::filesys::dir::Dir;
use app_stager::models::app::{App, Framework};
use app_stager::staging::{AppStager, InMemoryTaskLogStore, StagingConfig};
use app_stager::storage::apps::InMemoryAppRepository;
use futures::FutureExt;
use staging_wire::StagingRequest;

pub const BITS_SHA1: &str = "d77e6195246d944913a35b6749e14763ebd6e709";
pub const BITS_SHA256: &str = "94383f71bb67e1abe7b5f06eab59a146924dea7bf9362394ef5fc528051d48d1";

pub struct Harness {
    pub tmp: tempfile::TempDir,
    pub channel: Arc<LoopbackChannel>,
    pub artifacts: Arc<LocalArtifactStore>,
    pub task_logs: Arc<InMemoryTaskLogStore>,
    pub apps: Arc<InMemoryAppRepository>,
    pub stager: Arc<AppStager>,
}

pub fn harness(config: StagingConfig) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let channel = Arc::new(LoopbackChannel::new());
    let artifacts = Arc::new(LocalArtifactStore::new(
        Dir::new(tmp.path().join("bits")),
        Dir::new(tmp.path().join("uploads")),
        Dir::new(tmp.path().join("droplets")),
        StagingUris::new("http://stager.local:9022", None, None).unwrap(),
    ));
    let task_logs = Arc::new(InMemoryTaskLogStore::new());
    let apps = Arc::new(InMemoryAppRepository::new());
    let stager = Arc::new(AppStager::new(
        config,
        channel.clone(),
        artifacts.clone(),
        task_logs.clone(),
        apps.clone(),
    ));
    Harness {
        tmp,
        channel,
        artifacts,
        task_logs,
        apps,
        stager,
    }
}

pub fn short_timeouts() -> StagingConfig {
    StagingConfig {
        max_staging_runtime: Duration::from_millis(100),
        async_request_timeout: Duration::from_millis(100),
        ..StagingConfig::default()
    }
}

/// The app of the success scenario: guid app-1, 512 MB memory, 1024 MB disk
pub fn app(guid: &str) -> App {
    let mut app = App::new(guid, "web");
    app.memory = 512;
    app.disk_quota = 1024;
    app.framework = Some(Framework {
        name: "ruby19".to_string(),
        internal_info: serde_json::json!({"runtimes": ["ruby19"]}),
    });
    app.environment_json = serde_json::from_str(r#"{"RACK_ENV":"production","PORT":"8080"}"#).unwrap();
    app
}

/// How a fake staging worker answers one request
#[derive(Debug, Clone)]
pub enum WorkerScript {
    /// Upload `droplet` (if any), then reply with `task_log`
    Succeed {
        task_log: String,
        droplet: Option<Vec<u8>>,
    },
    /// Reply with an explicit error
    Fail(String),
    /// Signal a transport error, then a successful reply
    ErrorThenReply(String),
    /// Upload and reply after `delay`
    Late(Duration),
}

/// Spawn a fake staging worker on `queue`
pub fn spawn_worker(h: &Harness, queue: &str, script: WorkerScript) {
    let artifacts = h.artifacts.clone();
    h.channel.serve(queue, move |inbound: InboundRequest| {
        let artifacts = artifacts.clone();
        let script = script.clone();
        async move { answer(inbound, artifacts.as_ref(), script).await }.boxed()
    });
}

async fn upload(artifacts: &LocalArtifactStore, app_id: &str, droplet: &[u8]) {
    if let Some(path) = artifacts.pending_upload_path(app_id) {
        tokio::fs::write(path, droplet).await.unwrap();
    }
}

async fn answer(inbound: InboundRequest, artifacts: &LocalArtifactStore, script: WorkerScript) {
    let request: StagingRequest = inbound.parse_json().unwrap();
    let replier = inbound.replier;
    match script {
        WorkerScript::Succeed { task_log, droplet } => {
            if let Some(droplet) = droplet {
                upload(artifacts, &request.app_id, &droplet).await;
            }
            replier
                .reply_json(&serde_json::json!({ "task_log": task_log }))
                .unwrap();
        }
        WorkerScript::Fail(message) => {
            replier
                .reply_json(&serde_json::json!({ "task_log": "partial", "error": message }))
                .unwrap();
        }
        WorkerScript::ErrorThenReply(message) => {
            replier.fail(message);
            upload(artifacts, &request.app_id, b"BITS").await;
            replier
                .reply_json(&serde_json::json!({ "task_log": "log-xyz" }))
                .unwrap();
        }
        WorkerScript::Late(delay) => {
            tokio::time::sleep(delay).await;
            upload(artifacts, &request.app_id, b"BITS").await;
            replier
                .reply_json(&serde_json::json!({ "task_log": "log-xyz" }))
                .unwrap();
        }
    }
}

pub fn succeed() -> WorkerScript {
    WorkerScript::Succeed {
        task_log: "log-xyz".to_string(),
        droplet: Some(b"BITS".to_vec()),
    }
}

/// Spawn a fake async staging worker replying with `reply`
pub fn spawn_async_worker(h: &Harness, reply: serde_json::Value) {
    h.channel.serve("staging.async", move |inbound: InboundRequest| {
        let reply = reply.clone();
        async move {
            inbound.replier.reply_json(&reply).unwrap();
        }
        .boxed()
    });
}
