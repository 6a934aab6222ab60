//! Stored records and their memory model.
//!
//! An [`Item`] is one keyspace entry: an opaque byte value plus expiry and
//! access-tracking metadata. Timestamps are unix milliseconds so they
//! survive a snapshot/restart round-trip; `0` is the "no expiry" sentinel.
//!
//! Access metadata lives in atomics so a successful read under the shared
//! half of the keyspace lock can still bump it. Only removal or an expiry
//! change needs the exclusive half.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Sentinel expiry meaning "never expires".
pub const NO_EXPIRY: u64 = 0;

/// Current wall-clock time in unix milliseconds.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Modeled header cost of a heap-allocated string (pointer + length).
const STRING_HEADER: u64 = 16;
/// Modeled footprint of the expiry/access timestamps.
const EXPIRY_FOOTPRINT: u64 = 24;
/// Modeled per-entry bookkeeping cost inside the hash map.
const MAP_ENTRY_FOOTPRINT: u64 = 32;

/// Estimates the memory footprint of one entry.
///
/// Two string headers (key and value) plus their payloads, the timestamp
/// block, and the map-entry overhead. The estimate feeds `mem_bytes`
/// accounting and eviction triggers, not allocator correctness.
#[inline]
pub fn approx_mem_usage(key: &str, value: &[u8]) -> u64 {
    STRING_HEADER
        + key.len() as u64
        + STRING_HEADER
        + value.len() as u64
        + EXPIRY_FOOTPRINT
        + MAP_ENTRY_FOOTPRINT
}

/// A single stored record.
#[derive(Debug)]
pub struct Item {
    /// The opaque value payload. No type parsing is done on it.
    pub value: Bytes,
    /// Absolute expiry in unix milliseconds, [`NO_EXPIRY`] when unset.
    pub expires_at_ms: u64,
    last_access_ms: AtomicU64,
    accesses: AtomicU64,
}

impl Item {
    /// Creates a fresh item with no expiry. Its last access starts at the
    /// insertion instant so never-read keys age from creation.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at_ms: NO_EXPIRY,
            last_access_ms: AtomicU64::new(now_ms()),
            accesses: AtomicU64::new(0),
        }
    }

    /// Reconstructs an item with explicit metadata (snapshot load path).
    pub fn from_parts(value: Bytes, expires_at_ms: u64, last_access_ms: u64, accesses: u64) -> Self {
        Self {
            value,
            expires_at_ms,
            last_access_ms: AtomicU64::new(last_access_ms),
            accesses: AtomicU64::new(accesses),
        }
    }

    /// Returns `true` if this item has an expiry and it has passed.
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms != NO_EXPIRY && now_ms >= self.expires_at_ms
    }

    /// Records a successful read.
    #[inline]
    pub fn touch(&self, now_ms: u64) {
        self.last_access_ms.store(now_ms, Ordering::Relaxed);
        self.accesses.fetch_add(1, Ordering::Relaxed);
    }

    /// Instant of the last successful read (unix milliseconds).
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    /// Count of successful reads.
    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }

    /// Estimated memory footprint of this entry under `key`.
    #[inline]
    pub fn mem_usage(&self, key: &str) -> u64 {
        approx_mem_usage(key, &self.value)
    }
}

impl Clone for Item {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            expires_at_ms: self.expires_at_ms,
            last_access_ms: AtomicU64::new(self.last_access_ms()),
            accesses: AtomicU64::new(self.accesses()),
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.expires_at_ms == other.expires_at_ms
            && self.last_access_ms() == other.last_access_ms()
            && self.accesses() == other.accesses()
    }
}

impl Eq for Item {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_usage_counts_key_and_value() {
        // 16 + 3 + 16 + 5 + 24 + 32
        assert_eq!(approx_mem_usage("foo", b"hello"), 96);
        assert_eq!(approx_mem_usage("", b""), 88);
    }

    #[test]
    fn new_item_has_no_expiry() {
        let item = Item::new(Bytes::from_static(b"v"));
        assert_eq!(item.expires_at_ms, NO_EXPIRY);
        assert!(!item.is_expired(now_ms()));
        assert_eq!(item.accesses(), 0);
    }

    #[test]
    fn expiry_sentinel_never_expires() {
        let item = Item::new(Bytes::from_static(b"v"));
        assert!(!item.is_expired(u64::MAX));
    }

    #[test]
    fn expired_when_deadline_passes() {
        let mut item = Item::new(Bytes::from_static(b"v"));
        item.expires_at_ms = 1_000;
        assert!(!item.is_expired(999));
        assert!(item.is_expired(1_000));
        assert!(item.is_expired(1_001));
    }

    #[test]
    fn touch_bumps_access_metadata() {
        let item = Item::new(Bytes::from_static(b"v"));
        item.touch(5_000);
        item.touch(6_000);
        assert_eq!(item.last_access_ms(), 6_000);
        assert_eq!(item.accesses(), 2);
    }

    #[test]
    fn clone_preserves_metadata() {
        let item = Item::from_parts(Bytes::from_static(b"v"), 42, 7, 3);
        let copy = item.clone();
        assert_eq!(item, copy);
        assert_eq!(copy.expires_at_ms, 42);
        assert_eq!(copy.last_access_ms(), 7);
        assert_eq!(copy.accesses(), 3);
    }
}
