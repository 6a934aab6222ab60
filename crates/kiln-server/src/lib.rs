//! kiln-server: the kiln process.
//!
//! Ties the protocol, keyspace, and durability crates together: config
//! file parsing, the process-wide [`state::ServerState`], command
//! dispatch with auth and transactions, per-connection tasks, and the
//! periodic background duties.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::{read_config, Config};
pub use server::Server;
pub use state::ServerState;
