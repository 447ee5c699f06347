//! Room image storage on the local filesystem, exposed under `/storage`.

use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const PUBLIC_PREFIX: &str = "/storage";

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    public_base_url: String,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores `bytes` under `rooms/` and returns the public URL.
    pub async fn put(&self, bytes: &[u8], content_type: &str) -> AppResult<String> {
        let ext = extension_for(content_type).ok_or_else(|| {
            AppError::BadRequest(format!("Unsupported image type {content_type}"))
        })?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Image body is empty".into()));
        }

        let key = format!("rooms/{}.{}", Uuid::new_v4(), ext);
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(e.into()))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        tracing::debug!(key = %key, size = bytes.len(), "stored image");
        Ok(self.public_url(&key))
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}{}/{}", self.public_base_url, PUBLIC_PREFIX, key)
    }

    /// Storage key for a URL this store issued, `None` for foreign URLs.
    pub fn key_for(&self, url: &str) -> Option<String> {
        let prefix = format!("{}{}/", self.public_base_url, PUBLIC_PREFIX);
        let key = url.strip_prefix(&prefix)?;
        if key.is_empty() || key.split('/').any(|part| part == ".." || part.is_empty()) {
            return None;
        }
        Some(key.to_string())
    }

    /// Removes the file behind `url`. Returns false when the URL is not ours.
    pub async fn delete(&self, url: &str) -> AppResult<bool> {
        let Some(key) = self.key_for(url) else {
            return Ok(false);
        };
        match fs::remove_file(self.root.join(&key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Internal(e.into())),
        }
    }
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> ImageStore {
        let dir = std::env::temp_dir().join(format!("hotel-images-{}", Uuid::new_v4()));
        ImageStore::new(dir, "http://localhost:3000/")
    }

    #[tokio::test]
    async fn put_then_delete_round_trips_through_public_url() {
        let store = temp_store();
        let url = store.put(b"\x89PNG....", "image/png").await.unwrap();
        assert!(url.starts_with("http://localhost:3000/storage/rooms/"));
        assert!(url.ends_with(".png"));

        let key = store.key_for(&url).unwrap();
        assert!(store.root().join(&key).exists());

        assert!(store.delete(&url).await.unwrap());
        assert!(!store.root().join(&key).exists());
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn rejects_non_image_content() {
        let store = temp_store();
        let err = store.put(b"hello", "text/plain").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn ignores_foreign_and_traversal_urls() {
        let store = temp_store();
        assert_eq!(store.key_for("https://cdn.example.com/a.png"), None);
        assert_eq!(
            store.key_for("http://localhost:3000/storage/../secret"),
            None
        );
        assert_eq!(
            store.key_for("http://localhost:3000/storage/rooms/a.jpg").as_deref(),
            Some("rooms/a.jpg")
        );
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        assert_eq!(extension_for("image/jpeg; charset=binary"), Some("jpg"));
        assert_eq!(extension_for("application/pdf"), None);
    }
}
