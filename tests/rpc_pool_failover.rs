//! RPC Pool Failover Integration Tests
//!
//! Drive the pool with scripted endpoint behaviour:
//! 1. Consecutive failures quarantine an endpoint
//! 2. Quarantined endpoints are skipped while another is healthy
//! 3. With everything quarantined a call still gets a target, the one
//!    whose quarantine ends first
//! 4. Quarantine expires after the penalty
//!
//! No network calls; operations are closures keyed on the URL.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use butters_discovery::adapters::rpc_pool::{RpcPool, RpcPoolError};

const E1: &str = "https://e1.example.com";
const E2: &str = "https://e2.example.com";
const E3: &str = "https://e3.example.com";

// ============================================================================
// Test Fixtures
// ============================================================================

fn pool(urls: &[&str], penalty_secs: u64) -> RpcPool {
    RpcPool::new(
        urls.iter().map(|u| u.to_string()).collect(),
        5,
        Duration::from_secs(penalty_secs),
    )
    .unwrap()
    .with_retry_delay(Duration::from_millis(1))
}

/// Calls `pool` once; URLs in `failing` error out. Returns the URLs tried.
async fn call_logged(pool: &RpcPool, failing: &[&str]) -> (Result<String, RpcPoolError>, Vec<String>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let result = pool
        .call(|url| {
            let log = log.clone();
            let fails = failing.contains(&url.as_str());
            async move {
                log.lock().unwrap().push(url.clone());
                if fails {
                    Err(format!("{} unavailable", url))
                } else {
                    Ok(url)
                }
            }
        })
        .await;
    let tried = log.lock().unwrap().clone();
    (result, tried)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_five_failures_quarantine_endpoint() {
    let pool = pool(&[E1, E2], 120);

    for _ in 0..5 {
        let (result, tried) = call_logged(&pool, &[E1]).await;
        assert_eq!(result.unwrap(), E2);
        assert_eq!(tried.first().map(String::as_str), Some(E1));
    }

    let status = pool.get_status().unwrap();
    assert_eq!(status.healthy, 1);
    assert_eq!(status.quarantined, 1);
    assert!(!status.endpoints[0].healthy);
    assert!(status.endpoints[0].quarantine_remaining_secs > 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_quarantined_endpoint_not_selected_while_other_healthy() {
    let pool = pool(&[E1, E2, E3], 120);
    // round-robin does not start every call on E1, so call until it trips
    let mut calls = 0;
    while pool.get_status().unwrap().quarantined == 0 {
        call_logged(&pool, &[E1]).await.0.unwrap();
        calls += 1;
        assert!(calls < 50);
    }

    for _ in 0..20 {
        let (result, tried) = call_logged(&pool, &[]).await;
        assert!(result.is_ok());
        assert!(!tried.iter().any(|u| u == E1), "quarantined endpoint was selected");
    }

    // healthy endpoints share the load round-robin
    let status = pool.get_status().unwrap();
    let e2_calls = status.endpoints[1].total_calls;
    let e3_calls = status.endpoints[2].total_calls;
    assert!(e2_calls >= 10 && e3_calls >= 10);
}

#[tokio::test(start_paused = true)]
async fn test_all_quarantined_still_resolves() {
    let pool = pool(&[E1, E2], 120);
    for _ in 0..5 {
        let (result, _) = call_logged(&pool, &[E1, E2]).await;
        assert!(matches!(result, Err(RpcPoolError::AllEndpointsFailed { attempts: 2, .. })));
    }
    assert_eq!(pool.get_status().unwrap().healthy, 0);

    // last resort: a call still runs against some endpoint and succeeds
    let (result, tried) = call_logged(&pool, &[]).await;
    assert!(result.is_ok());
    assert_eq!(tried.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_last_resort_prefers_earliest_recovery() {
    let pool = pool(&[E1, E2], 120);

    let mut calls = 0;
    while pool.get_status().unwrap().quarantined == 0 {
        call_logged(&pool, &[E2]).await.0.unwrap();
        calls += 1;
        assert!(calls < 50);
    }
    assert!(!pool.get_status().unwrap().endpoints[1].healthy);

    // E1 trips 30s later, so E2 recovers first
    tokio::time::sleep(Duration::from_secs(30)).await;
    for _ in 0..5 {
        let (result, tried) = call_logged(&pool, &[E1]).await;
        assert_eq!(result.unwrap(), E2);
        assert_eq!(tried, vec![E1.to_string(), E2.to_string()]);
    }
    let status = pool.get_status().unwrap();
    assert_eq!(status.healthy, 0);
    assert!(status.endpoints[1].quarantine_remaining_secs < status.endpoints[0].quarantine_remaining_secs);

    for _ in 0..3 {
        let (result, tried) = call_logged(&pool, &[]).await;
        assert_eq!(result.unwrap(), E2);
        assert_eq!(tried, vec![E2.to_string()]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_quarantine_expires_after_penalty() {
    let pool = pool(&[E1, E2], 30);
    for _ in 0..5 {
        call_logged(&pool, &[E1]).await.0.unwrap();
    }
    assert_eq!(pool.get_status().unwrap().quarantined, 1);

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(pool.get_status().unwrap().healthy, 2);
    let mut saw_e1 = false;
    for _ in 0..4 {
        let (_, tried) = call_logged(&pool, &[]).await;
        saw_e1 |= tried.iter().any(|u| u == E1);
    }
    assert!(saw_e1);
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_error_counter() {
    let pool = pool(&[E1, E2], 120);
    for _ in 0..4 {
        call_logged(&pool, &[E1]).await.0.unwrap();
    }
    // E1 recovers before the threshold
    for _ in 0..2 {
        call_logged(&pool, &[]).await.0.unwrap();
    }
    for _ in 0..4 {
        call_logged(&pool, &[E1]).await.0.unwrap();
    }
    assert_eq!(pool.get_status().unwrap().healthy, 2);
}
