//! Errors raised by revision stores.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("revision database: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be turned back into a tracked member.
    #[error("corrupt revision record: {0}")]
    InvalidData(String),

    #[error("schema migration: {0}")]
    Migration(String),

    /// The blocking worker running a query panicked or was cancelled.
    #[error("revision store worker: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
