use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CatalogError, Result};

/// Stat result for a backend path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
    pub is_directory: bool,
}

/// Minimal surface the rename tracker needs from a storage backend.
///
/// Paths are absolute within the storage root, `/`-separated regardless of
/// the backend's native convention.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileSystemClient: Send + Sync {
    /// Move a file or directory. Fails if the destination exists.
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn metadata(&self, path: &str) -> Result<Option<RemoteMetadata>>;
}

/// Client for a locally mounted root, backed by `tokio::fs`.
#[derive(Debug, Clone)]
pub struct LocalFileSystemClient {
    base: PathBuf,
}

impl LocalFileSystemClient {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(Path::new(path.trim_start_matches('/')))
    }
}

#[async_trait]
impl FileSystemClient for LocalFileSystemClient {
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let from = self.resolve(old_path);
        let to = self.resolve(new_path);

        if tokio::fs::try_exists(&to).await? {
            return Err(CatalogError::InvalidInput(format!(
                "move destination already exists: {new_path}"
            )));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn metadata(&self, path: &str) -> Result<Option<RemoteMetadata>> {
        match tokio::fs::metadata(self.resolve(path)).await {
            Ok(meta) => {
                let modified = meta.modified().ok().map(DateTime::<Utc>::from);
                Ok(Some(RemoteMetadata {
                    size: meta.len() as i64,
                    modified,
                    is_directory: meta.is_dir(),
                }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_client_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let client = LocalFileSystemClient::new(tmp.path());

        tokio::fs::write(tmp.path().join("a.txt"), b"payload").await.unwrap();

        assert!(client.exists("/a.txt").await.unwrap());
        let meta = client.metadata("/a.txt").await.unwrap().unwrap();
        assert_eq!(meta.size, 7);
        assert!(!meta.is_directory);

        client.rename("/a.txt", "/nested/b.txt").await.unwrap();
        assert!(!client.exists("/a.txt").await.unwrap());
        assert!(client.exists("/nested/b.txt").await.unwrap());
        assert!(client.metadata("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_refuses_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let client = LocalFileSystemClient::new(tmp.path());

        tokio::fs::write(tmp.path().join("a.txt"), b"a").await.unwrap();
        tokio::fs::write(tmp.path().join("b.txt"), b"b").await.unwrap();

        assert!(client.rename("/a.txt", "/b.txt").await.is_err());
        assert!(client.exists("/a.txt").await.unwrap());
    }
}
