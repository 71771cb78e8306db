//! RPC Endpoint Pool
//!
//! Runs read operations against a rotating set of RPC endpoints. Healthy
//! endpoints are picked round-robin; when every endpoint is quarantined the
//! one whose quarantine ends first is used anyway, so a call always has a
//! target.

use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::endpoint::{redact_url, Endpoint, EndpointStatus, DEFAULT_ERROR_THRESHOLD, DEFAULT_PENALTY_SECS};

/// Fixed delay between attempts on different endpoints
pub const RETRY_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum RpcPoolError {
    #[error("RPC pool needs at least one endpoint")]
    NoEndpoints,

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("All endpoints failed after {attempts} attempts, last error: {last_error}")]
    AllEndpointsFailed { attempts: usize, last_error: String },

    #[error("RPC pool state lock poisoned")]
    LockPoisoned,
}

/// Read-only pool health report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub healthy: usize,
    pub quarantined: usize,
    pub endpoints: Vec<EndpointStatus>,
}

#[derive(Debug)]
struct PoolState {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

#[derive(Debug)]
pub struct RpcPool {
    state: Mutex<PoolState>,
    error_threshold: u32,
    penalty: Duration,
    retry_delay: Duration,
}

impl RpcPool {
    pub fn new(
        urls: Vec<String>,
        error_threshold: u32,
        penalty: Duration,
    ) -> Result<Self, RpcPoolError> {
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        if urls.is_empty() {
            return Err(RpcPoolError::NoEndpoints);
        }
        if let Some(bad) = urls
            .iter()
            .find(|u| !(u.starts_with("http://") || u.starts_with("https://")))
        {
            return Err(RpcPoolError::InvalidEndpoint(redact_url(bad)));
        }

        Ok(Self {
            state: Mutex::new(PoolState {
                endpoints: urls.into_iter().map(Endpoint::new).collect(),
                cursor: 0,
            }),
            error_threshold: error_threshold.max(1),
            penalty,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Pool with the default threshold (5) and penalty (120s)
    pub fn with_defaults(urls: Vec<String>) -> Result<Self, RpcPoolError> {
        Self::new(urls, DEFAULT_ERROR_THRESHOLD, Duration::from_secs(DEFAULT_PENALTY_SECS))
    }

    /// Override the inter-attempt delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.endpoints.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute `op(url)` with failover.
    ///
    /// Each endpoint is tried at most once per call. On exhaustion the last
    /// error is returned together with the attempt count.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, RpcPoolError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let total = self.len();
        let mut tried: Vec<usize> = Vec::with_capacity(total);
        let mut last_error = String::from("no attempt made");

        while tried.len() < total {
            let (idx, url) = self.select(&tried)?;
            tried.push(idx);

            match op(url.clone()).await {
                Ok(value) => {
                    self.record_success(idx)?;
                    return Ok(value);
                }
                Err(e) => {
                    last_error = e.to_string();
                    let quarantined = self.record_failure(idx)?;
                    warn!(
                        endpoint = %redact_url(&url),
                        attempt = tried.len(),
                        quarantined,
                        error = %last_error,
                        "RPC call failed"
                    );
                    if tried.len() < total {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(RpcPoolError::AllEndpointsFailed {
            attempts: tried.len(),
            last_error,
        })
    }

    /// Current health of every endpoint
    pub fn get_status(&self) -> Result<PoolStatus, RpcPoolError> {
        let state = self.state.lock().map_err(|_| RpcPoolError::LockPoisoned)?;
        let now = Instant::now();
        let endpoints: Vec<EndpointStatus> =
            state.endpoints.iter().map(|e| e.status(now)).collect();
        let healthy = endpoints.iter().filter(|e| e.healthy).count();
        Ok(PoolStatus {
            total: endpoints.len(),
            healthy,
            quarantined: endpoints.len() - healthy,
            endpoints,
        })
    }

    /// Pick the next endpoint not yet tried in this call
    fn select(&self, tried: &[usize]) -> Result<(usize, String), RpcPoolError> {
        let mut state = self.state.lock().map_err(|_| RpcPoolError::LockPoisoned)?;
        let now = Instant::now();
        let n = state.endpoints.len();

        let healthy = (0..n)
            .map(|offset| (state.cursor + offset) % n)
            .find(|&i| !tried.contains(&i) && state.endpoints[i].is_healthy(now));

        let chosen = match healthy {
            Some(i) => i,
            None => {
                // Everything left is quarantined: take the one that recovers first
                let fallback = (0..n)
                    .filter(|i| !tried.contains(i))
                    .min_by_key(|&i| state.endpoints[i].quarantine_until());
                match fallback {
                    Some(i) => {
                        debug!(endpoint = %redact_url(state.endpoints[i].url()), "No healthy endpoint, using last resort");
                        i
                    }
                    None => {
                        return Err(RpcPoolError::AllEndpointsFailed {
                            attempts: tried.len(),
                            last_error: "no untried endpoint".into(),
                        })
                    }
                }
            }
        };

        state.cursor = (chosen + 1) % n;
        let endpoint = &mut state.endpoints[chosen];
        endpoint.mark_used(now);
        Ok((chosen, endpoint.url().to_string()))
    }

    fn record_success(&self, idx: usize) -> Result<(), RpcPoolError> {
        let mut state = self.state.lock().map_err(|_| RpcPoolError::LockPoisoned)?;
        if let Some(ep) = state.endpoints.get_mut(idx) {
            ep.record_success();
        }
        Ok(())
    }

    fn record_failure(&self, idx: usize) -> Result<bool, RpcPoolError> {
        let mut state = self.state.lock().map_err(|_| RpcPoolError::LockPoisoned)?;
        let now = Instant::now();
        let (threshold, penalty) = (self.error_threshold, self.penalty);
        Ok(state
            .endpoints
            .get_mut(idx)
            .map(|ep| ep.record_failure(now, threshold, penalty))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn urls() -> Vec<String> {
        vec!["https://e1.example.com".into(), "https://e2.example.com".into()]
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(matches!(RpcPool::with_defaults(vec![]), Err(RpcPoolError::NoEndpoints)));
        assert!(matches!(
            RpcPool::with_defaults(vec!["  ".into()]),
            Err(RpcPoolError::NoEndpoints)
        ));
    }

    #[test]
    fn test_non_http_rejected() {
        let result = RpcPool::with_defaults(vec!["wss://e1.example.com".into()]);
        assert!(matches!(result, Err(RpcPoolError::InvalidEndpoint(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_over_healthy() {
        let pool = RpcPool::with_defaults(urls()).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let url = pool.call(|url| async move { Ok::<_, String>(url) }).await.unwrap();
            seen.push(url);
        }
        assert_eq!(
            seen,
            vec![
                "https://e1.example.com",
                "https://e2.example.com",
                "https://e1.example.com",
                "https://e2.example.com"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_to_next_endpoint() {
        let pool = RpcPool::with_defaults(urls()).unwrap();
        let result = pool
            .call(|url| async move {
                if url.contains("e1") {
                    Err("connection refused".to_string())
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);

        let status = pool.get_status().unwrap();
        assert_eq!(status.endpoints[0].errors, 1);
        assert_eq!(status.endpoints[1].errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregated_failure() {
        let pool = RpcPool::with_defaults(urls()).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result: Result<(), _> = pool
            .call(move |_url| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("timeout")
                }
            })
            .await;

        match result {
            Err(RpcPoolError::AllEndpointsFailed { attempts: n, last_error }) => {
                assert_eq!(n, 2);
                assert_eq!(last_error, "timeout");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // one attempt per endpoint
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_counts() {
        let pool = RpcPool::new(urls(), 1, Duration::from_secs(30)).unwrap();
        let _ = pool
            .call(|url| async move {
                if url.contains("e1") {
                    Err("boom")
                } else {
                    Ok(())
                }
            })
            .await;

        let status = pool.get_status().unwrap();
        assert_eq!(status.total, 2);
        assert_eq!(status.healthy, 1);
        assert_eq!(status.quarantined, 1);
        assert!(!status.endpoints[0].healthy);
        assert!(status.endpoints[0].quarantine_remaining_secs > 29.0);
    }
}
