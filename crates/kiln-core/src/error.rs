//! Error types for the store.

use thiserror::Error;

/// Errors returned by keyspace mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The memory ceiling is set and eviction could not free enough
    /// room for the incoming entry.
    #[error("maximum memory reached")]
    MaxMemoryReached,
}
