//! kiln-persistence: durability for the keyspace.
//!
//! Two orthogonal mechanisms: the append-only command log ([`aof`]) that
//! records every SET as its RESP wire form, and the checksummed snapshot
//! ([`rdb`]) that captures the whole mapping at a point in time.

pub mod aof;
pub mod error;
pub mod format;
pub mod rdb;

pub use aof::{AofLog, FsyncPolicy};
pub use error::PersistError;
