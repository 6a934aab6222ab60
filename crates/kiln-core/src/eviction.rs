//! Sampled eviction policies.
//!
//! When a write would cross the memory ceiling, the keyspace draws a
//! bounded sample of entries and this module decides the order they are
//! removed in. Sampling trades precision for bounded work per write: the
//! victim is the best candidate in the sample, not globally.

use std::str::FromStr;

/// How victims are chosen when memory must be freed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Never evict; a write over the ceiling fails.
    #[default]
    NoEviction,
    /// Evict sampled keys in sample order.
    AllKeysRandom,
    /// Evict the least-recently-read sampled key first.
    AllKeysLru,
    /// Evict the least-read sampled key first.
    AllKeysLfu,
    /// Like `AllKeysRandom`, restricted to keys with an expiry.
    VolatileRandom,
    /// Like `AllKeysLru`, restricted to keys with an expiry.
    VolatileLru,
    /// Like `AllKeysLfu`, restricted to keys with an expiry.
    VolatileLfu,
    /// Evict the soonest-expiring sampled key first.
    VolatileTtl,
}

impl EvictionPolicy {
    /// Returns `true` if this policy only considers keys with an expiry.
    pub fn volatile_only(self) -> bool {
        matches!(
            self,
            EvictionPolicy::VolatileRandom
                | EvictionPolicy::VolatileLru
                | EvictionPolicy::VolatileLfu
                | EvictionPolicy::VolatileTtl
        )
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noeviction" => Ok(EvictionPolicy::NoEviction),
            "allkeys-random" => Ok(EvictionPolicy::AllKeysRandom),
            "allkeys-lru" => Ok(EvictionPolicy::AllKeysLru),
            "allkeys-lfu" => Ok(EvictionPolicy::AllKeysLfu),
            "volatile-random" => Ok(EvictionPolicy::VolatileRandom),
            "volatile-lru" => Ok(EvictionPolicy::VolatileLru),
            "volatile-lfu" => Ok(EvictionPolicy::VolatileLfu),
            "volatile-ttl" => Ok(EvictionPolicy::VolatileTtl),
            other => Err(format!("unknown eviction policy '{other}'")),
        }
    }
}

/// One sampled entry, carrying just the metadata ordering needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SampleEntry {
    pub key: String,
    pub last_access_ms: u64,
    pub accesses: u64,
    pub expires_at_ms: u64,
}

/// Orders a sample so victims sit at the front.
///
/// LRU evicts the least-recently-read key first and LFU the least-read
/// key first; `volatile-ttl` puts the soonest expiry first. The random
/// policies keep sample order, which already reflects an arbitrary walk
/// of the map.
pub(crate) fn order_sample(policy: EvictionPolicy, sample: &mut [SampleEntry]) {
    match policy {
        EvictionPolicy::AllKeysLru | EvictionPolicy::VolatileLru => {
            sample.sort_by_key(|e| e.last_access_ms);
        }
        EvictionPolicy::AllKeysLfu | EvictionPolicy::VolatileLfu => {
            sample.sort_by_key(|e| e.accesses);
        }
        EvictionPolicy::VolatileTtl => {
            sample.sort_by_key(|e| e.expires_at_ms);
        }
        EvictionPolicy::NoEviction
        | EvictionPolicy::AllKeysRandom
        | EvictionPolicy::VolatileRandom => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, last_access_ms: u64, accesses: u64, expires_at_ms: u64) -> SampleEntry {
        SampleEntry {
            key: key.into(),
            last_access_ms,
            accesses,
            expires_at_ms,
        }
    }

    fn keys(sample: &[SampleEntry]) -> Vec<&str> {
        sample.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn parse_all_policies() {
        for (name, policy) in [
            ("noeviction", EvictionPolicy::NoEviction),
            ("allkeys-random", EvictionPolicy::AllKeysRandom),
            ("allkeys-lru", EvictionPolicy::AllKeysLru),
            ("allkeys-lfu", EvictionPolicy::AllKeysLfu),
            ("volatile-random", EvictionPolicy::VolatileRandom),
            ("volatile-lru", EvictionPolicy::VolatileLru),
            ("volatile-lfu", EvictionPolicy::VolatileLfu),
            ("volatile-ttl", EvictionPolicy::VolatileTtl),
        ] {
            assert_eq!(name.parse::<EvictionPolicy>().unwrap(), policy);
            assert_eq!(
                name.to_ascii_uppercase().parse::<EvictionPolicy>().unwrap(),
                policy
            );
        }
        assert!("lru".parse::<EvictionPolicy>().is_err());
    }

    #[test]
    fn volatile_scoping() {
        assert!(EvictionPolicy::VolatileTtl.volatile_only());
        assert!(EvictionPolicy::VolatileLru.volatile_only());
        assert!(!EvictionPolicy::AllKeysLru.volatile_only());
        assert!(!EvictionPolicy::NoEviction.volatile_only());
    }

    /// Pins the LRU eviction direction: the least-recently-read key is
    /// the first victim.
    #[test]
    fn lru_orders_least_recently_used_first() {
        let mut sample = vec![
            entry("recent", 3_000, 0, 0),
            entry("oldest", 1_000, 0, 0),
            entry("middle", 2_000, 0, 0),
        ];
        order_sample(EvictionPolicy::AllKeysLru, &mut sample);
        assert_eq!(keys(&sample), ["oldest", "middle", "recent"]);
    }

    #[test]
    fn lfu_orders_least_read_first() {
        let mut sample = vec![
            entry("hot", 0, 10, 0),
            entry("cold", 0, 0, 0),
            entry("warm", 0, 5, 0),
        ];
        order_sample(EvictionPolicy::AllKeysLfu, &mut sample);
        assert_eq!(keys(&sample), ["cold", "warm", "hot"]);
    }

    #[test]
    fn ttl_orders_soonest_expiry_first() {
        let mut sample = vec![
            entry("later", 0, 0, 9_000),
            entry("soon", 0, 0, 1_000),
            entry("mid", 0, 0, 5_000),
        ];
        order_sample(EvictionPolicy::VolatileTtl, &mut sample);
        assert_eq!(keys(&sample), ["soon", "mid", "later"]);
    }

    #[test]
    fn random_keeps_sample_order() {
        let mut sample = vec![entry("a", 9, 9, 9), entry("b", 1, 1, 1)];
        let before = sample.clone();
        order_sample(EvictionPolicy::AllKeysRandom, &mut sample);
        assert_eq!(sample, before);
    }
}
