//! kiln-core: the storage engine.
//!
//! Owns the shared keyspace: items with expiry and access metadata,
//! byte-level memory accounting, glob matching for KEYS, and the sampled
//! eviction engine that enforces the memory ceiling.

pub mod error;
pub mod eviction;
pub mod glob;
pub mod item;
pub mod keyspace;
pub mod stats;

pub use error::StoreError;
pub use eviction::EvictionPolicy;
pub use glob::glob_match;
pub use item::{approx_mem_usage, now_ms, Item, NO_EXPIRY};
pub use keyspace::{Keyspace, StoreConfig, TtlResult};
pub use stats::StoreStats;
