//! Task logs of successful staging attempts

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::StagerError;
use crate::filesys::dir::Dir;
use crate::utils::ensure_path_safe;

/// Log blob produced by a staging worker for one app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingTaskLog {
    pub app_id: String,
    pub task_log: String,
    pub recorded_at: DateTime<Utc>,
}

impl StagingTaskLog {
    pub fn new(app_id: impl Into<String>, task_log: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            task_log: task_log.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Storage key of an app's task log
    pub fn key_for(app_id: &str) -> String {
        format!("staging_task_log:{}", app_id)
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.app_id)
    }
}

/// Key/value sink for task logs; a put replaces the previous log of the app
#[async_trait]
pub trait TaskLogStore: Send + Sync {
    async fn put(&self, log: &StagingTaskLog) -> Result<(), StagerError>;

    async fn fetch(&self, app_id: &str) -> Result<Option<StagingTaskLog>, StagerError>;
}

/// One JSON file per app
pub struct FileTaskLogStore {
    dir: Dir,
}

impl FileTaskLogStore {
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }

    fn file_name(app_id: &str) -> Result<String, StagerError> {
        ensure_path_safe(app_id)?;
        Ok(format!("{}.json", StagingTaskLog::key_for(app_id).replace(':', "_")))
    }
}

#[async_trait]
impl TaskLogStore for FileTaskLogStore {
    async fn put(&self, log: &StagingTaskLog) -> Result<(), StagerError> {
        let file = self.dir.file(&Self::file_name(&log.app_id)?);
        file.write_json(log).await?;
        debug!("Stored task log: {}", log.key());
        Ok(())
    }

    async fn fetch(&self, app_id: &str) -> Result<Option<StagingTaskLog>, StagerError> {
        let file = self.dir.file(&Self::file_name(app_id)?);
        if !file.exists().await {
            return Ok(None);
        }
        Ok(Some(file.read_json().await?))
    }
}

#[derive(Default)]
pub struct InMemoryTaskLogStore {
    entries: RwLock<HashMap<String, StagingTaskLog>>,
}

impl InMemoryTaskLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_id: &str) -> Option<StagingTaskLog> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&StagingTaskLog::key_for(app_id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskLogStore for InMemoryTaskLogStore {
    async fn put(&self, log: &StagingTaskLog) -> Result<(), StagerError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(log.key(), log.clone());
        Ok(())
    }

    async fn fetch(&self, app_id: &str) -> Result<Option<StagingTaskLog>, StagerError> {
        Ok(self.get(app_id))
    }
}
