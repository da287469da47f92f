//! Media storage for uploaded videos, thumbnails and avatars.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub type SharedBlobStore = Arc<dyn BlobStore>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<StoredBlob>;

    /// Deleting a key that does not exist is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    fn public_url(&self, key: &str) -> String;

    /// Inverse of [`BlobStore::public_url`]; `None` for URLs hosted elsewhere.
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Deletes the blob behind `url`, logging instead of failing.
pub async fn delete_url_best_effort(blobs: &dyn BlobStore, url: &str) {
    let Some(key) = blobs.key_for_url(url) else {
        return;
    };
    if let Err(e) = blobs.delete(&key).await {
        warn!("Failed to delete blob {}: {:?}", key, e);
    }
}

pub struct LocalBlobStore {
    base_path: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(base_path: PathBuf, base_url: String) -> Self {
        Self {
            base_path,
            base_url,
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<StoredBlob> {
        let path = self.base_path.join(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                tracing::error!("Failed to create media directory: {:?}", e);
                AppError::InternalServerError
            })?;
        }

        tokio::fs::write(&path, data).await.map_err(|e| {
            tracing::error!("Failed to write media file: {:?}", e);
            AppError::InternalServerError
        })?;

        Ok(StoredBlob {
            key: key.to_string(),
            url: self.public_url(key),
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.base_path.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::error!("Failed to delete media file: {:?}", e);
                Err(AppError::InternalServerError)
            }
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        let prefix = format!("{}/", self.base_url.trim_end_matches('/'));
        url.strip_prefix(&prefix)
            .filter(|key| !key.is_empty() && !key.split('/').any(|seg| seg == ".."))
            .map(str::to_string)
    }
}

/// `{prefix}/{YYYY/MM/DD}/{uid}/{millis}_{uuid}.{ext}`
pub fn generate_storage_key(prefix: &str, user_id: &str, original_name: &str) -> String {
    let now = Utc::now();
    let date_path = now.format("%Y/%m/%d").to_string();
    let timestamp = now.timestamp_millis();

    let extension = original_name
        .rfind('.')
        .filter(|&pos| pos > 0 && pos < original_name.len() - 1)
        .map(|pos| &original_name[pos + 1..])
        .filter(|ext| ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");

    format!(
        "{}/{}/{}/{}_{}.{}",
        prefix,
        date_path,
        user_id,
        timestamp,
        Uuid::new_v4(),
        extension.to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_storage_key() {
        let key = generate_storage_key("videos", "user123", "clip.MP4");
        assert!(key.starts_with("videos/"));
        assert!(key.contains("/user123/"));
        assert!(key.ends_with(".mp4"));
    }

    #[test]
    fn test_generate_storage_key_no_extension() {
        assert!(generate_storage_key("thumbnails", "u", "file").ends_with(".bin"));
        assert!(generate_storage_key("thumbnails", "u", "weird.e/x").ends_with(".bin"));
    }

    #[tokio::test]
    async fn test_local_upload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path().to_path_buf(), "/media/".to_string());

        let stored = blobs
            .upload("videos/u1/a.mp4", b"frames", "video/mp4")
            .await
            .unwrap();
        assert_eq!(stored.url, "/media/videos/u1/a.mp4");
        assert_eq!(stored.size, 6);
        assert!(dir.path().join("videos/u1/a.mp4").exists());

        assert_eq!(
            blobs.key_for_url(&stored.url).as_deref(),
            Some("videos/u1/a.mp4")
        );
        assert_eq!(blobs.key_for_url("https://cdn.example.com/a.mp4"), None);
        assert_eq!(blobs.key_for_url("/media/../etc/passwd"), None);

        delete_url_best_effort(&blobs, &stored.url).await;
        assert!(!dir.path().join("videos/u1/a.mp4").exists());

        // Already gone.
        blobs.delete("videos/u1/a.mp4").await.unwrap();
    }
}
