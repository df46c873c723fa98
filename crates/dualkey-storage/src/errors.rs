//! Storage error types.

use thiserror::Error;

/// Storage failures
///
/// Per-operation failures carry the column family, never the key.
#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB rejected a read, write or iteration
    #[error("Database error in {cf}: {reason}")]
    Database { cf: String, reason: String },

    /// A key or value could not be encoded or decoded
    #[error("Codec error in {cf}: {reason}")]
    Codec { cf: String, reason: String },

    /// A batch precondition failed at commit; nothing was written
    #[error("Conflicting record in {cf}")]
    Conflict { cf: String },

    /// Column family missing from the opened database
    #[error("Unknown column family: {0}")]
    UnknownColumnFamily(String),

    #[error("Could not open database: {0}")]
    Open(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn database(cf: &str) -> impl FnOnce(rocksdb::Error) -> Self + '_ {
        move |e| StorageError::Database {
            cf: cf.to_string(),
            reason: e.to_string(),
        }
    }

    pub(crate) fn codec(cf: &str) -> impl FnOnce(bincode::Error) -> Self + '_ {
        move |e| StorageError::Codec {
            cf: cf.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
