//! Freshness Cache
//!
//! TTL map of candidate keys to their sighting times.
//! - Lookups purge the key they touch when it has expired
//! - `sweep` drops expired keys and keys nobody has read recently
//!
//! Time is passed in by the caller so the engine can drive it from its clock.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Default candidate TTL (10 minutes)
pub const DEFAULT_TTL_SECS: i64 = 600;
/// Default max cache entries
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Sighting record for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessEntry {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_read: DateTime<Utc>,
}

impl FreshnessEntry {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            first_seen: at,
            last_seen: at,
            last_read: at,
        }
    }

    /// Age measured from first sighting
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.first_seen).max(Duration::zero())
    }
}

/// Result of recording a sighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    /// Not tracked, or tracked but expired
    New,
    /// Live key; only `last_seen` moved
    Repeat { first_seen: DateTime<Utc> },
}

#[derive(Debug)]
pub struct FreshnessCache {
    entries: HashMap<String, FreshnessEntry>,
    ttl: Duration,
    /// Entries unread for this long are dropped by `sweep`
    idle_ttl: Duration,
    max_entries: usize,
}

impl FreshnessCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_config(ttl, ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_config(ttl: Duration, idle_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            idle_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expired(&self, entry: &FreshnessEntry, now: DateTime<Utc>) -> bool {
        entry.age(now) >= self.ttl
    }

    /// Record a sighting at `seen_at`, evaluated at `now`.
    ///
    /// A sighting older than the current record moves `first_seen` back;
    /// first-seen never moves forward for a live key.
    pub fn observe(&mut self, key: &str, seen_at: DateTime<Utc>, now: DateTime<Utc>) -> Sighting {
        let seen_at = seen_at.min(now);
        let expired = self.entries.get(key).map(|e| self.expired(e, now));

        match expired {
            Some(false) => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.first_seen = entry.first_seen.min(seen_at);
                    entry.last_seen = entry.last_seen.max(now);
                    return Sighting::Repeat {
                        first_seen: entry.first_seen,
                    };
                }
                Sighting::New
            }
            Some(true) => {
                self.entries.insert(key.to_string(), FreshnessEntry::new(seen_at));
                Sighting::New
            }
            None => {
                if self.entries.len() >= self.max_entries {
                    self.sweep(now);
                }
                if self.entries.len() >= self.max_entries {
                    self.remove_oldest();
                }
                self.entries.insert(key.to_string(), FreshnessEntry::new(seen_at));
                Sighting::New
            }
        }
    }

    /// Get a live entry; an expired one is removed
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<FreshnessEntry> {
        let entry = *self.entries.get(key)?;
        if self.expired(&entry, now) {
            self.entries.remove(key);
            return None;
        }
        Some(entry)
    }

    /// Note that a consumer looked at `key`
    pub fn mark_read(&mut self, key: &str, now: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_read = entry.last_read.max(now);
        }
    }

    pub fn contains(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        self.get(key, now).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<FreshnessEntry> {
        self.entries.remove(key)
    }

    /// Drop expired and idle entries; returns how many went
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let (ttl, idle) = (self.ttl, self.idle_ttl);
        self.entries.retain(|_, e| e.age(now) < ttl && now - e.last_read < idle);
        before - self.entries.len()
    }

    fn remove_oldest(&mut self) {
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.first_seen)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&oldest_key);
        }
    }

    /// Number of entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> FreshnessStats {
        let total = self.entries.len();
        let live = self.entries.values().filter(|e| !self.expired(e, now)).count();
        FreshnessStats {
            total_entries: total,
            live_entries: live,
            expired_entries: total - live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreshnessStats {
    pub total_entries: usize,
    pub live_entries: usize,
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_repeat_updates_last_seen_only() {
        let mut cache = FreshnessCache::new(Duration::seconds(600));
        assert_eq!(cache.observe("m", t0(), t0()), Sighting::New);

        let later = t0() + Duration::seconds(30);
        assert_eq!(cache.observe("m", later, later), Sighting::Repeat { first_seen: t0() });

        let entry = cache.get("m", later).unwrap();
        assert_eq!(entry.first_seen, t0());
        assert_eq!(entry.last_seen, later);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_earlier_sighting_moves_first_seen_back() {
        let mut cache = FreshnessCache::new(Duration::seconds(600));
        let now = t0() + Duration::seconds(20);
        cache.observe("m", now, now);
        cache.observe("m", t0(), now);
        assert_eq!(cache.get("m", now).unwrap().first_seen, t0());
    }

    #[test]
    fn test_lookup_purges_expired() {
        let mut cache = FreshnessCache::new(Duration::seconds(60));
        cache.observe("m", t0(), t0());
        assert!(cache.contains("m", t0() + Duration::seconds(59)));
        assert!(!cache.contains("m", t0() + Duration::seconds(60)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_key_is_new_again() {
        let mut cache = FreshnessCache::new(Duration::seconds(60));
        cache.observe("m", t0(), t0());
        let later = t0() + Duration::seconds(61);
        assert_eq!(cache.observe("m", later, later), Sighting::New);
        assert_eq!(cache.get("m", later).unwrap().first_seen, later);
    }

    #[test]
    fn test_sweep_drops_idle_entries() {
        let mut cache = FreshnessCache::with_config(Duration::seconds(600), Duration::seconds(120), 100);
        cache.observe("read", t0(), t0());
        cache.observe("idle", t0(), t0());
        cache.mark_read("read", t0() + Duration::seconds(100));

        let removed = cache.sweep(t0() + Duration::seconds(150));
        assert_eq!(removed, 1);
        assert!(cache.contains("read", t0() + Duration::seconds(150)));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = FreshnessCache::with_config(Duration::seconds(600), Duration::seconds(600), 2);
        cache.observe("a", t0(), t0());
        cache.observe("b", t0() + Duration::seconds(1), t0() + Duration::seconds(1));
        cache.observe("c", t0() + Duration::seconds(2), t0() + Duration::seconds(2));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a", t0() + Duration::seconds(2)));
    }

    #[test]
    fn test_stats() {
        let mut cache = FreshnessCache::new(Duration::seconds(60));
        cache.observe("a", t0(), t0());
        cache.observe("b", t0() + Duration::seconds(30), t0() + Duration::seconds(30));
        let stats = cache.stats(t0() + Duration::seconds(70));
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.live_entries, 1);
        assert_eq!(stats.expired_entries, 1);
    }
}
