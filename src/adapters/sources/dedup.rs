//! Short-lived "seen" set kept by each source adapter.
//!
//! Separate from the engine's freshness cache: it only stops a single feed
//! from re-emitting the same mint over and over.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::Evidence;

/// How long a source remembers an id
pub const DEFAULT_SEEN_TTL_SECS: u64 = 300;

/// Upper bound on remembered ids
pub const DEFAULT_MAX_SEEN: usize = 50_000;

#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    evidence: Evidence,
    at: Instant,
}

#[derive(Debug)]
pub struct SeenSet {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<String, SeenEntry>,
}

impl SeenSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: DEFAULT_MAX_SEEN,
            entries: HashMap::new(),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Record an observation. Returns true when it should be forwarded:
    /// the id is new or expired, or the evidence is stronger than before.
    pub fn observe(&mut self, id: &str, evidence: Evidence, now: Instant) -> bool {
        if let Some(entry) = self.entries.get_mut(id) {
            if now.saturating_duration_since(entry.at) < self.ttl {
                if evidence.supersedes(entry.evidence) {
                    entry.evidence = evidence;
                    entry.at = now;
                    return true;
                }
                return false;
            }
        }

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(id) {
            self.purge(now);
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.entries.insert(id.to_string(), SeenEntry { evidence, at: now });
        true
    }

    /// Drop expired ids
    pub fn purge(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.at) < ttl);
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.at)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
