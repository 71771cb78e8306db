//! Endpoint health
//!
//! One upstream URL and its quarantine state. Healthy until `error_threshold`
//! consecutive failures, then quarantined for the penalty duration.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Default consecutive failures before quarantine
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

/// Default quarantine duration
pub const DEFAULT_PENALTY_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Endpoint {
    url: String,
    consecutive_errors: u32,
    quarantine_until: Option<Instant>,
    last_used: Option<Instant>,
    total_calls: u64,
    total_errors: u64,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            consecutive_errors: 0,
            quarantine_until: None,
            last_used: None,
            total_calls: 0,
            total_errors: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn quarantine_until(&self) -> Option<Instant> {
        self.quarantine_until
    }

    pub fn last_used(&self) -> Option<Instant> {
        self.last_used
    }

    /// Usable once the quarantine deadline has passed
    pub fn is_healthy(&self, now: Instant) -> bool {
        self.quarantine_until.map_or(true, |until| now >= until)
    }

    /// Time left in quarantine, zero when healthy
    pub fn quarantine_remaining(&self, now: Instant) -> Duration {
        self.quarantine_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn mark_used(&mut self, now: Instant) {
        self.last_used = Some(now);
        self.total_calls += 1;
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Count a failure. Returns true when this failure tripped the quarantine.
    pub fn record_failure(&mut self, now: Instant, threshold: u32, penalty: Duration) -> bool {
        self.consecutive_errors += 1;
        self.total_errors += 1;
        if self.consecutive_errors >= threshold {
            self.quarantine_until = Some(now + penalty);
            self.consecutive_errors = 0;
            return true;
        }
        false
    }

    pub fn status(&self, now: Instant) -> EndpointStatus {
        EndpointStatus {
            url: redact_url(&self.url),
            healthy: self.is_healthy(now),
            errors: self.consecutive_errors,
            quarantine_remaining_secs: self.quarantine_remaining(now).as_secs_f64(),
            total_calls: self.total_calls,
            total_errors: self.total_errors,
        }
    }
}

/// Per-endpoint snapshot for status reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStatus {
    pub url: String,
    pub healthy: bool,
    pub errors: u32,
    pub quarantine_remaining_secs: f64,
    pub total_calls: u64,
    pub total_errors: u64,
}

/// Strip the query string, where providers put API keys
pub fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?…", base),
        None => url.to_string(),
    }
}
