//! Error Types
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, PoolError>`.

use thiserror::Error;

/// The error type for pooled buffer allocation.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The backing device failed to create a buffer.
    ///
    /// Fatal to the `allocate` call that triggered it: the allocator does
    /// not retry and does not fall back to a smaller size.
    #[error("Failed to create backing buffer: {0}")]
    BufferCreation(String),

    /// An allocation of zero records was requested.
    #[error("Record count must be greater than zero")]
    ZeroRecords,
}

/// Alias for `Result<T, PoolError>`.
pub type Result<T> = std::result::Result<T, PoolError>;
