//! Process-wide server state.
//!
//! One [`ServerState`] is shared (via `Arc`) by every connection task and
//! background duty; there are no module-level globals. Background flags
//! are atomics; `db_copy` is the detached mapping a background save
//! encodes from while the live store keeps mutating.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use kiln_core::{now_ms, Item, Keyspace};
use kiln_persistence::{rdb, AofLog, PersistError};
use tracing::warn;

use crate::config::Config;

/// Everything the server tracks across its lifetime.
pub struct ServerState {
    /// The shared key-value store.
    pub keyspace: Keyspace,
    /// Parsed configuration, fixed at startup.
    pub config: Config,
    /// The append-only log, when `appendonly yes`.
    pub aof: Option<AofLog>,
    /// Per-save-rule dirty counters, index-aligned with
    /// `config.save_rules`.
    dirty: Vec<AtomicU64>,
    /// Detached mapping a background save encodes from.
    db_copy: Mutex<Option<HashMap<String, Item>>>,
    /// Guards BGSAVE against running twice at once.
    pub bg_save_running: AtomicBool,
    /// Guards BGREWRITEAOF against running twice at once.
    pub aof_rewrite_running: AtomicBool,
    /// When the process started.
    pub start_time: Instant,
    /// Total connections ever accepted.
    pub connections_total: AtomicU64,
    /// Total commands ever dispatched.
    pub commands_total: AtomicU64,
    /// Completed snapshot saves.
    pub rdb_saves: AtomicU64,
    /// Unix seconds of the last completed save.
    pub rdb_last_save_ts: AtomicU64,
}

impl ServerState {
    /// Builds the state from a parsed config, opening the append-only
    /// log when enabled. A log that cannot be opened logs the failure
    /// and the server runs without one.
    pub fn new(config: Config) -> Self {
        let keyspace = Keyspace::new(config.store_config());

        let aof = if config.aof_enabled {
            match AofLog::open(config.aof_path(), config.aof_fsync) {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!(
                        path = %config.aof_path().display(),
                        error = %e,
                        "cannot open append-only log, continuing without it"
                    );
                    None
                }
            }
        } else {
            None
        };

        let dirty = config.save_rules.iter().map(|_| AtomicU64::new(0)).collect();

        Self {
            keyspace,
            config,
            aof,
            dirty,
            db_copy: Mutex::new(None),
            bg_save_running: AtomicBool::new(false),
            aof_rewrite_running: AtomicBool::new(false),
            start_time: Instant::now(),
            connections_total: AtomicU64::new(0),
            commands_total: AtomicU64::new(0),
            rdb_saves: AtomicU64::new(0),
            rdb_last_save_ts: AtomicU64::new(0),
        }
    }

    /// Bumps every snapshot rule's dirty counter. Called when a mutating
    /// command completes.
    pub fn mark_dirty(&self) {
        for counter in &self.dirty {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drains the dirty counter of one snapshot rule, returning the
    /// number of mutations since its last tick.
    pub fn take_dirty(&self, rule: usize) -> u64 {
        self.dirty[rule].swap(0, Ordering::SeqCst)
    }

    /// Parks the mapping a background save will encode from.
    pub fn stash_db_copy(&self, copy: HashMap<String, Item>) {
        *self.lock_db_copy() = Some(copy);
    }

    /// Releases the background save's mapping.
    pub fn release_db_copy(&self) {
        *self.lock_db_copy() = None;
    }

    /// Runs the blocking save protocol. Encodes the parked copy while a
    /// background save owns it, the live store otherwise; on success the
    /// save counters advance.
    pub fn run_save(&self) -> Result<(), PersistError> {
        let entries = if self.bg_save_running.load(Ordering::SeqCst) {
            self.lock_db_copy()
                .clone()
                .unwrap_or_else(|| self.keyspace.snapshot())
        } else {
            self.keyspace.snapshot()
        };

        rdb::save(&self.config.rdb_path(), &entries)?;

        self.rdb_saves.fetch_add(1, Ordering::Relaxed);
        self.rdb_last_save_ts
            .store(now_ms() / 1000, Ordering::Relaxed);
        Ok(())
    }

    fn lock_db_copy(&self) -> MutexGuard<'_, Option<HashMap<String, Item>>> {
        self.db_copy.lock().expect("db copy lock poisoned")
    }
}
