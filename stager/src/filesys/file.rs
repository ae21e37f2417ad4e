//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::StagerError;

/// A file wrapper with path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read file contents as bytes
    pub async fn read_bytes(&self) -> Result<Vec<u8>, StagerError> {
        Ok(fs::read(&self.path).await?)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, StagerError> {
        let contents = self.read_bytes().await?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Write JSON to file atomically
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), StagerError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&contents).await
    }

    /// Atomic write using a temporary file next to the target
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), StagerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Move this file to `target`, falling back to copy + delete across devices
    pub async fn move_to(&self, target: &File) -> Result<(), StagerError> {
        if let Some(parent) = target.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if fs::rename(&self.path, &target.path).await.is_err() {
            fs::copy(&self.path, &target.path).await?;
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    /// Delete the file, returning whether it existed
    pub async fn delete(&self) -> Result<bool, StagerError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_roundtrip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("nested").join("value.json"));

        file.write_json(&serde_json::json!({"a": 1})).await.unwrap();
        let value: serde_json::Value = file.read_json().await.unwrap();
        assert_eq!(value["a"], 1);

        assert!(file.delete().await.unwrap());
        assert!(!file.delete().await.unwrap());
        assert!(!file.exists().await);
    }

    #[tokio::test]
    async fn test_move_to() {
        let dir = tempfile::tempdir().unwrap();
        let source = File::new(dir.path().join("source"));
        let target = File::new(dir.path().join("out").join("target"));
        source.write_atomic(b"BITS").await.unwrap();

        source.move_to(&target).await.unwrap();

        assert!(!source.exists().await);
        assert_eq!(target.read_bytes().await.unwrap(), b"BITS".to_vec());
    }
}
