use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use domain::AssetKey;

use super::{AssetDelivery, AssetStorage, validate_key};
use crate::error::StorageError;

/// Serves assets from a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalAssetStorage {
    root: PathBuf,
}

impl LocalAssetStorage {
    /// Creates the storage, creating `root` if needed and canonicalizing it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Classifies a path that failed to resolve.
    ///
    /// The deepest entry that exists decides: a dangling symlink whose
    /// target lies outside the root is an escape, anything else is absent.
    async fn classify_unresolved(&self, candidate: &Path) -> Result<StorageError, StorageError> {
        for existing in candidate.ancestors() {
            let Ok(metadata) = tokio::fs::symlink_metadata(existing).await else {
                continue;
            };

            let target = if metadata.file_type().is_symlink() {
                let link = tokio::fs::read_link(existing).await?;
                let parent = existing.parent().unwrap_or(self.root.as_path());
                normalize(&tokio::fs::canonicalize(parent).await?.join(link))
            } else {
                tokio::fs::canonicalize(existing).await?
            };

            return Ok(if target.starts_with(&self.root) {
                StorageError::NotFound
            } else {
                StorageError::OutsideRoot
            });
        }
        Ok(StorageError::NotFound)
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}

#[async_trait]
impl AssetStorage for LocalAssetStorage {
    async fn open(&self, key: &AssetKey) -> Result<AssetDelivery, StorageError> {
        let relative = validate_key(key)?;
        let candidate = self.root.join(&relative);

        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let error = self.classify_unresolved(&candidate).await?;
                if matches!(error, StorageError::OutsideRoot) {
                    tracing::error!(key = %key.as_str(), "asset link points outside the storage root");
                }
                return Err(error);
            }
            Err(e) => return Err(e.into()),
        };

        // Symlinks inside the root may still point outside it.
        if !resolved.starts_with(&self.root) {
            tracing::error!(key = %key.as_str(), "asset resolves outside the storage root");
            return Err(StorageError::OutsideRoot);
        }

        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }

        let file = tokio::fs::File::open(&resolved).await?;
        let file_name = relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(StorageError::InvalidKey("key has no file name"))?;

        Ok(AssetDelivery::File {
            file,
            file_name,
            size: metadata.len(),
        })
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
