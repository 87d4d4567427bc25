// src/storage.rs

use crate::config::StorageSection;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::info;
use urlencoding::encode;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object name '{0}'")]
    InvalidName(String),
    #[error("failed to write object '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Keeps the original uploads next to their extracted records.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, file_name: &str, bytes: Vec<u8>) -> Result<StoredObject, StorageError>;
}

/// `{prefix}/{YYYY-MM-DD}/{file_name}`, keeping only the last path component
/// of `file_name`.
pub fn object_key(prefix: &str, date: Date, file_name: &str) -> Result<String, StorageError> {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| StorageError::InvalidName(file_name.to_string()))?;

    let day = date
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|_| StorageError::InvalidName(file_name.to_string()))?;

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        Ok(format!("{day}/{name}"))
    } else {
        Ok(format!("{prefix}/{day}/{name}"))
    }
}

/// Public URL of `key`, each path segment percent-encoded.
pub fn public_url(base: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(encode).collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

/// An object store backed by a local directory.
pub struct LocalObjectStore {
    root: PathBuf,
    prefix: String,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(settings: &StorageSection) -> Self {
        Self {
            root: settings.root.clone(),
            prefix: settings.prefix.clone(),
            public_base_url: settings.public_base_url.clone(),
        }
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, file_name: &str, bytes: Vec<u8>) -> Result<StoredObject, StorageError> {
        let key = object_key(&self.prefix, OffsetDateTime::now_utc().date(), file_name)?;
        let path = self.root.join(&key);
        let size = bytes.len();

        let written = tokio::task::spawn_blocking(move || Self::write_atomic(&path, &bytes)).await?;
        written.map_err(|source| StorageError::Write {
            key: key.clone(),
            source,
        })?;

        let url = public_url(&self.public_base_url, &key);
        info!(key = %key, bytes = size, url = %url, "Stored object");
        Ok(StoredObject { key, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_object_key_layout() {
        let key = object_key("uploads", date!(2025 - 05 - 17), "solicitud.pdf").unwrap();
        assert_eq!(key, "uploads/2025-05-17/solicitud.pdf");

        let key = object_key("/uploads/", date!(2025 - 01 - 02), "dir/inner/form.pdf").unwrap();
        assert_eq!(key, "uploads/2025-01-02/form.pdf");

        let key = object_key("", date!(2025 - 01 - 02), "form.pdf").unwrap();
        assert_eq!(key, "2025-01-02/form.pdf");
    }

    #[test]
    fn test_object_key_rejects_empty_name() {
        assert!(matches!(
            object_key("uploads", date!(2025 - 05 - 17), ""),
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            object_key("uploads", date!(2025 - 05 - 17), "dir/.."),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[test]
    fn test_public_url_encodes_segments() {
        let url = public_url(
            "https://bucket.example/",
            "uploads/2025-05-17/Solicitud Conciliación.pdf",
        );
        assert_eq!(
            url,
            "https://bucket.example/uploads/2025-05-17/Solicitud%20Conciliaci%C3%B3n.pdf"
        );
    }

    #[tokio::test]
    async fn test_local_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(&StorageSection {
            root: dir.path().to_path_buf(),
            prefix: "uploads".into(),
            public_base_url: "http://localhost:8080".into(),
        });

        let stored = store.put("form.pdf", b"%PDF-1.5".to_vec()).await.unwrap();
        assert!(stored.key.starts_with("uploads/"));
        assert!(stored.key.ends_with("/form.pdf"));
        assert_eq!(stored.url, format!("http://localhost:8080/{}", stored.key));

        let on_disk = std::fs::read(dir.path().join(&stored.key)).unwrap();
        assert_eq!(on_disk, b"%PDF-1.5");

        // overwriting the same key replaces the content
        let again = store.put("form.pdf", b"%PDF-1.7".to_vec()).await.unwrap();
        assert_eq!(again.key, stored.key);
        assert_eq!(std::fs::read(dir.path().join(&again.key)).unwrap(), b"%PDF-1.7");
    }
}
