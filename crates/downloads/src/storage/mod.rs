//! Asset storage backends.
//!
//! Storage is the only place an asset key is turned into a filesystem path
//! or a URL.

mod local;
mod s3;

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use domain::AssetKey;

pub use local::LocalAssetStorage;
pub use s3::{DEFAULT_SIGNED_URL_TTL, S3AssetStorage};

use crate::error::StorageError;

/// How an asset reaches the buyer.
#[derive(Debug)]
pub enum AssetDelivery {
    /// An open file to stream back, with the name to present it under.
    File {
        file: tokio::fs::File,
        file_name: String,
        size: u64,
    },
    /// A short-lived URL the buyer fetches directly.
    SignedUrl { url: String, expires_in: Duration },
}

/// Resolves asset keys to deliverable assets.
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Opens the asset stored under `key`.
    async fn open(&self, key: &AssetKey) -> Result<AssetDelivery, StorageError>;

    /// Short backend name for logs and metrics.
    fn backend(&self) -> &'static str;
}

/// Checks that `key` is a plain relative key and returns it as a path.
///
/// Rejects empty keys, absolute keys, and any `..` segment, whether the
/// separator is `/` or `\`.
pub fn validate_key(key: &AssetKey) -> Result<PathBuf, StorageError> {
    let raw = key.as_str();

    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key"));
    }
    if raw.contains('\0') {
        return Err(StorageError::InvalidKey("nul byte in key"));
    }
    if raw.starts_with('/') || raw.starts_with('\\') {
        return Err(StorageError::InvalidKey("absolute key"));
    }
    if raw.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey("parent segment in key"));
    }

    let path = Path::new(raw);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(StorageError::InvalidKey("parent segment in key")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidKey("absolute key"));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(StorageError::InvalidKey("empty key"));
    }
    Ok(relative)
}
