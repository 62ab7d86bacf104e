use common::SessionId;
use thiserror::Error;

/// Errors that can occur when interacting with the order or product store.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// An insert raced with another writer and the winning row could not be read back.
    #[error("Conflicting write for session {0}")]
    Conflict(SessionId),

    /// A stored row could not be mapped back into a domain value.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// The store refused the write (used by the in-memory store to simulate outages).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, OrderStoreError>;
