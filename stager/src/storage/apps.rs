//! Application record storage

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::StagerError;
use crate::filesys::dir::Dir;
use crate::models::app::App;
use crate::utils::ensure_path_safe;

/// Access to persisted application records
#[async_trait]
pub trait AppRepository: Send + Sync {
    /// Find an app by guid
    async fn find(&self, guid: &str) -> Result<Option<App>, StagerError>;

    /// Persist an app
    async fn save(&self, app: &App) -> Result<(), StagerError>;
}

/// Stores each app as `<guid>.json` in a directory
pub struct FileAppRepository {
    dir: Dir,
}

impl FileAppRepository {
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl AppRepository for FileAppRepository {
    async fn find(&self, guid: &str) -> Result<Option<App>, StagerError> {
        ensure_path_safe(guid)?;
        let file = self.dir.file(&format!("{}.json", guid));
        if !file.exists().await {
            return Ok(None);
        }
        Ok(Some(file.read_json().await?))
    }

    async fn save(&self, app: &App) -> Result<(), StagerError> {
        ensure_path_safe(&app.guid)?;
        let file = self.dir.file(&format!("{}.json", app.guid));
        file.write_json(app).await?;
        debug!("Saved app record: {}", app.guid);
        Ok(())
    }
}

/// In-memory app records
#[derive(Default)]
pub struct InMemoryAppRepository {
    apps: RwLock<HashMap<String, App>>,
}

impl InMemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the repository with an app
    pub fn insert(&self, app: App) {
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        apps.insert(app.guid.clone(), app);
    }

    /// Synchronous lookup for assertions
    pub fn get(&self, guid: &str) -> Option<App> {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        apps.get(guid).cloned()
    }
}

#[async_trait]
impl AppRepository for InMemoryAppRepository {
    async fn find(&self, guid: &str) -> Result<Option<App>, StagerError> {
        Ok(self.get(guid))
    }

    async fn save(&self, app: &App) -> Result<(), StagerError> {
        self.insert(app.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_repository_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FileAppRepository::new(Dir::new(tmp.path()));

        let mut app = App::new("app-1", "web");
        app.environment_json = serde_json::from_str(r#"{"B":"2","A":"1"}"#).unwrap();
        repo.save(&app).await.unwrap();

        let loaded = repo.find("app-1").await.unwrap().unwrap();
        assert_eq!(loaded, app);
        assert_eq!(loaded.environment(), vec!["B=2".to_string(), "A=1".to_string()]);

        assert!(repo.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_repository_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = FileAppRepository::new(Dir::new(tmp.path()));
        assert!(matches!(
            repo.find("../etc").await,
            Err(StagerError::ValidationError(_))
        ));
    }
}
