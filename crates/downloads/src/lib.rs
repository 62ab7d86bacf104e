//! Download entitlement and asset delivery.
//!
//! Issues short-lived download tokens for paid orders and redeems them,
//! re-checking the order on every redemption before handing the asset to
//! the configured storage backend.

pub mod error;
pub mod service;
pub mod storage;
pub mod token;

pub use error::{Denial, DownloadError, StorageError, TokenRejection};
pub use service::{DownloadService, IssuedToken};
pub use storage::{
    AssetDelivery, AssetStorage, DEFAULT_SIGNED_URL_TTL, LocalAssetStorage, S3AssetStorage,
};
pub use token::{DEFAULT_TOKEN_TTL, DownloadClaims, TokenIssuer, TokenVerification};
