//! Download error types.

use std::time::Duration;

use order_store::OrderStoreError;
use thiserror::Error;

/// Errors raised by an asset storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The asset key is not a safe relative key.
    #[error("Invalid asset key: {0}")]
    InvalidKey(&'static str),

    /// The resolved location lies outside the storage root.
    #[error("Asset path escapes the storage root")]
    OutsideRoot,

    /// No asset exists under the key.
    #[error("Asset not found")]
    NotFound,

    /// The remote backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true when the error means the catalog points somewhere it must not.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, StorageError::InvalidKey(_) | StorageError::OutsideRoot)
    }
}

/// Why a presented download token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Expired,
    InvalidSignature,
    Malformed,
}

impl TokenRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::Expired => "expired",
            TokenRejection::InvalidSignature => "invalid_signature",
            TokenRejection::Malformed => "malformed",
        }
    }
}

/// Why an authenticated caller was denied access to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotOwner,
    NotPaid,
    TokenMismatch,
}

impl Denial {
    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::NotOwner => "not_owner",
            Denial::NotPaid => "not_paid",
            Denial::TokenMismatch => "token_mismatch",
        }
    }
}

/// Errors raised while issuing or redeeming download tokens.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No token signing secret is configured.
    #[error("Download token secret is not configured")]
    NotConfigured,

    /// The presented token was refused.
    #[error("Invalid download token ({})", .0.as_str())]
    InvalidToken(TokenRejection),

    /// The order does not exist.
    #[error("Order not found")]
    OrderNotFound,

    /// The caller may not access the order.
    #[error("Access denied ({})", .0.as_str())]
    Forbidden(Denial),

    /// The product or asset behind a paid order is gone.
    #[error("Asset not found")]
    AssetNotFound,

    /// Storage did not answer within the configured bound.
    #[error("Storage timed out after {0:?}")]
    Timeout(Duration),

    /// Token signing failed.
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Asset storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Order or product store error.
    #[error("Order store error: {0}")]
    Store(#[from] OrderStoreError),
}
