use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::clock::Clock;
use super::token_data::{AssetMetadata, MetadataPort, OnChainSnapshot, TokenDataError, TokenDataPort};

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/// Token data port that records calls and returns scripted snapshots.
///
/// Unknown mints get `default_snapshot`; mints in the failure set error out.
#[derive(Debug, Clone, Default)]
pub struct MockTokenData {
    calls: Arc<Mutex<Vec<String>>>,
    snapshots: Arc<Mutex<HashMap<String, OnChainSnapshot>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    default_snapshot: OnChainSnapshot,
    delay: Option<Duration>,
}

impl MockTokenData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot returned for mints without a specific response
    pub fn with_default(mut self, snapshot: OnChainSnapshot) -> Self {
        self.default_snapshot = snapshot;
        self
    }

    /// Builder method to set a response for a given mint
    pub fn with_snapshot(self, mint: &str, snapshot: OnChainSnapshot) -> Self {
        if let Ok(mut map) = self.snapshots.lock() {
            map.insert(mint.to_string(), snapshot);
        }
        self
    }

    /// Builder method to make lookups for `mint` fail
    pub fn failing_for(self, mint: &str) -> Self {
        if let Ok(mut set) = self.failing.lock() {
            set.insert(mint.to_string());
        }
        self
    }

    /// Delay every lookup, for timeout tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TokenDataPort for MockTokenData {
    async fn fetch_snapshot(&self, mint: &str) -> Result<OnChainSnapshot, TokenDataError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(mint.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let fails = self.failing.lock().map(|f| f.contains(mint)).unwrap_or(false);
        if fails {
            return Err(TokenDataError::Rpc(format!("scripted failure for {}", mint)));
        }
        let snapshot = self
            .snapshots
            .lock()
            .ok()
            .and_then(|m| m.get(mint).cloned())
            .unwrap_or_else(|| self.default_snapshot.clone());
        Ok(snapshot)
    }
}

/// Metadata port with fixed answers
#[derive(Debug, Clone, Default)]
pub struct MockMetadata {
    entries: Arc<Mutex<HashMap<String, AssetMetadata>>>,
    delay: Option<Duration>,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, mint: &str, symbol: &str, name: &str) -> Self {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(
                mint.to_string(),
                AssetMetadata {
                    symbol: Some(symbol.to_string()),
                    name: Some(name.to_string()),
                },
            );
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MetadataPort for MockMetadata {
    async fn lookup(&self, mint: &str) -> Result<AssetMetadata, TokenDataError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.entries
            .lock()
            .ok()
            .and_then(|m| m.get(mint).cloned())
            .ok_or_else(|| TokenDataError::NotFound(mint.to_string()))
    }
}
