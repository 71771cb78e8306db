//! RPC Endpoint Pool Adapter
//!
//! Failover-aware access to a static list of Solana RPC endpoints:
//! - Round-robin over healthy endpoints
//! - Quarantine after consecutive failures, automatic recovery after the penalty
//! - Last-resort selection when every endpoint is quarantined

mod endpoint;
mod pool;

pub use endpoint::{redact_url, Endpoint, EndpointStatus, DEFAULT_ERROR_THRESHOLD, DEFAULT_PENALTY_SECS};
pub use pool::{PoolStatus, RpcPool, RpcPoolError, RETRY_DELAY_MS};
