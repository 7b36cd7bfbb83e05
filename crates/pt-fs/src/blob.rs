use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use pt_core::{BlobStore, CoreError, CoreResult};

use crate::run_blocking;

/// Blob store writing decoded images under a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a blob store rooted at the provided directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> CoreResult<PathBuf> {
        let relative = Path::new(path);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if path.trim().is_empty() || !is_plain {
            return Err(CoreError::Validation(format!("invalid blob path: {path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, base64_data: &str) -> CoreResult<String> {
        let target = self.resolve(path)?;
        let image = pt_utils::decode_image_data(base64_data)
            .map_err(|err| CoreError::Validation(err.to_string()))?;
        debug!(path, bytes = image.bytes.len(), "storing image");

        run_blocking(move || {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| CoreError::StoreUnavailable(err.to_string()))?;
            }
            fs::write(&target, &image.bytes)
                .map_err(|err| CoreError::StoreUnavailable(err.to_string()))?;
            Ok(format!("file://{}", target.display()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn put_writes_decoded_bytes() {
        let temp = TempDir::new().expect("temp dir");
        let blobs = FsBlobStore::new(temp.path().to_path_buf());

        let url = blobs
            .put("user-1/milk.jpg", "data:image/jpeg;base64,aGVsbG8=")
            .await
            .unwrap();

        let written = temp.path().join("user-1/milk.jpg");
        assert_eq!(url, format!("file://{}", written.display()));
        assert_eq!(fs::read(written).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn put_rejects_escaping_paths() {
        let temp = TempDir::new().expect("temp dir");
        let blobs = FsBlobStore::new(temp.path().to_path_buf());

        for path in ["../outside.png", "/etc/passwd", ""] {
            let result = blobs.put(path, "aGVsbG8=").await;
            assert!(matches!(result, Err(CoreError::Validation(_))), "{path}");
        }
    }

    #[tokio::test]
    async fn put_rejects_bad_image_data() {
        let temp = TempDir::new().expect("temp dir");
        let blobs = FsBlobStore::new(temp.path().to_path_buf());
        let result = blobs.put("user-1/milk.png", "%%%").await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
