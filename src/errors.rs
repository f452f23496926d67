// restoretool/src/errors.rs
use thiserror::Error;

/// Stage-level failures of the restore pipeline. Every error propagates to
/// the top-level restore call unretried; temp artifacts are cleaned up before
/// the caller sees it.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Could not transfer {name}: {reason}")]
    Transfer { name: String, reason: String },

    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Dump decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),

    #[error("Schema operation failed: {0}")]
    Schema(String),

    #[error("Privilege grant rejected: {0}")]
    Privilege(String),

    #[error("Import failed: {error} ({statement})")]
    Import { statement: String, error: String },

    #[error("Key storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, RestoreError>;
