//! Image storage for product pictures.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, info};

/// Namespace product images are stored under.
pub const PRODUCTS_NAMESPACE: &str = "products";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("empty file")]
    Empty,
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("'{0}' is not an image")]
    NotAnImage(String),
    #[error("invalid namespace '{0}'")]
    InvalidNamespace(String),
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Largest upload accepted, enforced while the request body is read.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

/// Stores a binary and returns the reference URL under which it can be served.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, namespace: &str) -> Result<String, UploadError>;
}

pub struct DiskImageStore {
    root: PathBuf,
    public_url: String,
    max_bytes: usize,
    namespace_pattern: Regex,
}

impl DiskImageStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>, max_bytes: usize) -> Self {
        DiskImageStore {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            max_bytes,
            namespace_pattern: Regex::new(r"^[a-z0-9_-]+$").expect("namespace pattern is valid"),
        }
    }

    fn check(&self, bytes: &[u8], file_name: &str, namespace: &str) -> Result<String, UploadError> {
        if !self.namespace_pattern.is_match(namespace) {
            return Err(UploadError::InvalidNamespace(namespace.to_string()));
        }
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge { size: bytes.len(), max: self.max_bytes });
        }

        let is_image = mime_guess::from_path(file_name)
            .first()
            .map(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .unwrap_or(false);
        if !is_image {
            return Err(UploadError::NotAnImage(file_name.to_string()));
        }

        let ext = std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| UploadError::NotAnImage(file_name.to_string()))?;
        Ok(ext)
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, namespace: &str) -> Result<String, UploadError> {
        debug!("Uploading {} ({} bytes) into {}", file_name, bytes.len(), namespace);

        let ext = self.check(&bytes, file_name, namespace)?;

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let stored_name = format!("{}-{}.{}", Utc::now().timestamp_millis(), suffix, ext);

        let dir = self.root.join(namespace);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            error!("Failed to create upload directory {}: {}", dir.display(), e);
            e
        })?;
        tokio::fs::write(dir.join(&stored_name), &bytes).await.map_err(|e| {
            error!("Failed to write {}: {}", stored_name, e);
            e
        })?;

        let url = format!("{}/{}/{}", self.public_url, namespace, stored_name);
        info!("Stored image at {}", url);
        Ok(url)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> DiskImageStore {
        DiskImageStore::new(dir.path(), "/uploads/", 16)
    }

    #[actix_web::test]
    async fn writes_file_and_returns_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let url = store(&dir)
            .upload(b"\x89PNG1234".to_vec(), "Copo.PNG", PRODUCTS_NAMESPACE)
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/products/"));
        assert!(url.ends_with(".png"));
        let stored = url.rsplit('/').next().unwrap();
        let suffix = stored.trim_end_matches(".png").rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        let written = std::fs::read(dir.path().join("products").join(stored)).unwrap();
        assert_eq!(written, b"\x89PNG1234");
    }

    #[actix_web::test]
    async fn rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir)
            .upload(b"hello".to_vec(), "notes.txt", PRODUCTS_NAMESPACE)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NotAnImage(_)));
    }

    #[actix_web::test]
    async fn rejects_empty_and_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        assert!(matches!(
            s.upload(Vec::new(), "a.jpg", PRODUCTS_NAMESPACE).await,
            Err(UploadError::Empty)
        ));
        assert!(matches!(
            s.upload(vec![0; 17], "a.jpg", PRODUCTS_NAMESPACE).await,
            Err(UploadError::TooLarge { size: 17, max: 16 })
        ));
    }

    #[actix_web::test]
    async fn rejects_namespace_with_path_segments() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir)
            .upload(b"img".to_vec(), "a.webp", "../etc")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidNamespace(_)));
    }
}
