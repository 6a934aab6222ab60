//! The keyspace: kiln's shared key-value store.
//!
//! A single readers-writer lock guards the map together with the
//! `mem_bytes` accounting counter, so read-modify-write of the counter is
//! atomic with the map edit that caused it. Reads take shared access;
//! mutations take exclusive access. Expired keys are removed lazily on
//! access: a read that observes an expired entry upgrades to the write
//! lock and re-checks the deadline before removing, so a concurrent
//! overwrite is never clobbered.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use rand::Rng;

use crate::error::StoreError;
use crate::eviction::{order_sample, EvictionPolicy, SampleEntry};
use crate::glob::glob_match;
use crate::item::{approx_mem_usage, now_ms, Item, NO_EXPIRY};
use crate::stats::StoreStats;

/// Limits the keyspace enforces on writes.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Memory ceiling in bytes; `0` disables the limit.
    pub max_memory: u64,
    /// Victim selection when a write would cross the ceiling.
    pub eviction: EvictionPolicy,
    /// How many entries one eviction pass may examine.
    pub mem_samples: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_memory: 0,
            eviction: EvictionPolicy::NoEviction,
            mem_samples: 5,
        }
    }
}

/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlResult {
    /// Key exists and has an expiry; remaining whole seconds (rounded up).
    Seconds(u64),
    /// Key exists but has no expiry set.
    NoExpiry,
    /// Key does not exist (or just lazily expired).
    Missing,
}

/// Map plus accounting, guarded together by one lock.
struct Inner {
    map: HashMap<String, Item>,
    mem_bytes: u64,
}

/// The shared key-value store.
pub struct Keyspace {
    inner: RwLock<Inner>,
    stats: StoreStats,
    config: StoreConfig,
}

impl Keyspace {
    /// Creates an empty keyspace enforcing `config`.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                mem_bytes: 0,
            }),
            stats: StoreStats::default(),
            config,
        }
    }

    /// Store-level counters (expired/evicted keys, peak memory).
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Retrieves the value for `key`, bumping its access metadata.
    ///
    /// Returns `None` for missing or expired keys; an expired key is
    /// removed on the spot.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = now_ms();
        {
            let inner = self.read();
            match inner.map.get(key) {
                None => return None,
                Some(item) if !item.is_expired(now) => {
                    item.touch(now);
                    return Some(item.value.clone());
                }
                Some(_) => {}
            }
        }
        // observed an expired entry under the read lock
        self.remove_if_expired(key);
        None
    }

    /// Stores a key-value pair, replacing any previous entry (its expiry
    /// included). Enforces the memory ceiling: if the insert would cross
    /// it, eviction runs first, and the set fails with
    /// [`StoreError::MaxMemoryReached`] when not enough can be freed;
    /// the incoming entry is then not inserted.
    pub fn set(&self, key: String, value: Bytes) -> Result<(), StoreError> {
        let new_approx = approx_mem_usage(&key, &value);
        let mut inner = self.write();

        if self.config.max_memory > 0 {
            // an overwrite frees the old entry's share first
            let credit = inner.map.get(&key).map(|i| i.mem_usage(&key)).unwrap_or(0);
            if inner.mem_bytes.saturating_sub(credit) + new_approx >= self.config.max_memory {
                self.evict_locked(&mut inner, new_approx)?;
            }
        }

        if let Some(old) = inner.map.remove(&key) {
            inner.mem_bytes = inner.mem_bytes.saturating_sub(old.mem_usage(&key));
        }
        inner.mem_bytes += new_approx;
        inner.map.insert(key, Item::new(value));
        self.stats.update_peak(inner.mem_bytes);
        Ok(())
    }

    /// Removes a key. Returns `true` if a live (non-expired) entry was
    /// removed.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.write();
        match inner.map.remove(key) {
            Some(item) => {
                inner.mem_bytes = inner.mem_bytes.saturating_sub(item.mem_usage(key));
                if item.is_expired(now_ms()) {
                    self.stats.record_expired(1);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Returns `true` if the key exists and hasn't expired. Does not
    /// touch access metadata.
    pub fn exists(&self, key: &str) -> bool {
        let inner = self.read();
        inner
            .map
            .get(key)
            .map(|item| !item.is_expired(now_ms()))
            .unwrap_or(false)
    }

    /// Returns every live key matching the glob `pattern`. O(N) over the
    /// keyspace.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = now_ms();
        let inner = self.read();
        inner
            .map
            .iter()
            .filter(|(_, item)| !item.is_expired(now))
            .filter(|(key, _)| glob_match(pattern.as_bytes(), key.as_bytes()))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Sets an absolute expiry of now + `seconds` on an existing key.
    /// Returns `false` if the key is missing or already expired.
    pub fn expire(&self, key: &str, seconds: u64) -> bool {
        let mut inner = self.write();
        let now = now_ms();

        let due = inner
            .map
            .get(key)
            .map(|item| item.is_expired(now))
            .unwrap_or(false);
        if due {
            if let Some(item) = inner.map.remove(key) {
                inner.mem_bytes = inner.mem_bytes.saturating_sub(item.mem_usage(key));
                self.stats.record_expired(1);
            }
            return false;
        }

        match inner.map.get_mut(key) {
            Some(item) => {
                item.expires_at_ms = now.saturating_add(seconds.saturating_mul(1000));
                true
            }
            None => false,
        }
    }

    /// Remaining time-to-live for a key. Expired keys are removed and
    /// reported as [`TtlResult::Missing`].
    pub fn ttl(&self, key: &str) -> TtlResult {
        let now = now_ms();
        {
            let inner = self.read();
            match inner.map.get(key) {
                None => return TtlResult::Missing,
                Some(item) if !item.is_expired(now) => {
                    return if item.expires_at_ms == NO_EXPIRY {
                        TtlResult::NoExpiry
                    } else {
                        // round up so a freshly set N-second TTL reads N
                        TtlResult::Seconds((item.expires_at_ms - now).div_ceil(1000))
                    };
                }
                Some(_) => {}
            }
        }
        self.remove_if_expired(key);
        TtlResult::Missing
    }

    /// Number of live entries. Expired-but-unreaped keys still count;
    /// they disappear on next access.
    pub fn len(&self) -> usize {
        self.read().map.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current estimated memory usage of all entries.
    pub fn mem_bytes(&self) -> u64 {
        self.read().mem_bytes
    }

    /// Drops every entry and resets accounting.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.map.clear();
        inner.mem_bytes = 0;
    }

    /// Detached copy of the whole mapping, taken under shared access.
    /// Snapshots and AOF rewrites encode from this so they never hold
    /// the lock during disk I/O.
    pub fn snapshot(&self) -> HashMap<String, Item> {
        self.read().map.clone()
    }

    /// Replaces the contents with a previously snapshotted mapping
    /// (startup recovery). Accounting is recomputed from scratch.
    pub fn load_snapshot(&self, map: HashMap<String, Item>) {
        let mem_bytes = map.iter().map(|(k, item)| item.mem_usage(k)).sum();
        let mut inner = self.write();
        inner.map = map;
        inner.mem_bytes = mem_bytes;
        self.stats.update_peak(mem_bytes);
    }

    /// Re-checks expiry under the write lock and removes the key if it
    /// really is due. Returns `true` if a key was reaped.
    fn remove_if_expired(&self, key: &str) -> bool {
        let mut inner = self.write();
        let due = inner
            .map
            .get(key)
            .map(|item| item.is_expired(now_ms()))
            .unwrap_or(false);
        if due {
            if let Some(item) = inner.map.remove(key) {
                inner.mem_bytes = inner.mem_bytes.saturating_sub(item.mem_usage(key));
                self.stats.record_expired(1);
            }
        }
        due
    }

    /// Frees room for `required` more bytes by sampled eviction.
    ///
    /// Walks the map from a random offset, collects up to `mem_samples`
    /// candidates (volatile policies only consider keys with an expiry),
    /// orders them per the policy, and deletes from the front until
    /// `mem_bytes + required` fits under the ceiling. Work is bounded by
    /// the sample size, so a single write never scans the whole map.
    fn evict_locked(&self, inner: &mut Inner, required: u64) -> Result<(), StoreError> {
        let policy = self.config.eviction;
        if policy == EvictionPolicy::NoEviction {
            return Err(StoreError::MaxMemoryReached);
        }

        let len = inner.map.len();
        let offset = if len > 1 {
            rand::thread_rng().gen_range(0..len)
        } else {
            0
        };

        let mut sample: Vec<SampleEntry> = inner
            .map
            .iter()
            .skip(offset)
            .chain(inner.map.iter().take(offset))
            .filter(|(_, item)| !policy.volatile_only() || item.expires_at_ms != NO_EXPIRY)
            .take(self.config.mem_samples)
            .map(|(key, item)| SampleEntry {
                key: key.clone(),
                last_access_ms: item.last_access_ms(),
                accesses: item.accesses(),
                expires_at_ms: item.expires_at_ms,
            })
            .collect();

        order_sample(policy, &mut sample);

        let mut evicted = 0u64;
        for entry in &sample {
            if inner.mem_bytes + required < self.config.max_memory {
                break;
            }
            if let Some(item) = inner.map.remove(&entry.key) {
                inner.mem_bytes = inner.mem_bytes.saturating_sub(item.mem_usage(&entry.key));
                evicted += 1;
            }
        }
        self.stats.record_evicted(evicted);

        if inner.mem_bytes + required < self.config.max_memory {
            Ok(())
        } else {
            Err(StoreError::MaxMemoryReached)
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("keyspace lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("keyspace lock poisoned")
    }
}
