//! Source adapters
//!
//! Each adapter turns one external feed into candidate stubs (and, for
//! PumpPortal, trade updates) on the shared queue. All of them run until
//! `stop()` and never block on a full queue.

pub mod dedup;
pub mod helius_logs;
pub mod mock_firehose;
pub mod pump_portal;
pub mod raydium_pools;
pub mod stream;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::application::queue::QueueProducer;
use crate::domain::{synthetic_symbol, Candidate};
use crate::ports::MetadataPort;

pub use dedup::SeenSet;
pub use helius_logs::{HeliusLogsConfig, HeliusLogsSource};
pub use mock_firehose::{MockFirehoseConfig, MockFirehoseSource};
pub use pump_portal::{PumpPortalConfig, PumpPortalSource};
pub use raydium_pools::{RaydiumPoolsConfig, RaydiumPoolsSource};
pub use stream::StreamConfig;

/// Upper bound on a metadata lookup before the synthetic symbol is used
pub const DEFAULT_METADATA_TIMEOUT_MS: u64 = 2000;

/// Source adapter errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A feed of new-token events
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run until [`SourceAdapter::stop`] is called
    async fn run(&self, queue: QueueProducer) -> Result<(), SourceError>;

    /// Request shutdown; returns immediately
    fn stop(&self);
}

/// The configured source variants
pub enum Source {
    HeliusLogs(HeliusLogsSource),
    RaydiumPools(RaydiumPoolsSource),
    PumpPortal(PumpPortalSource),
    MockFirehose(MockFirehoseSource),
}

impl Source {
    fn inner(&self) -> &dyn SourceAdapter {
        match self {
            Source::HeliusLogs(s) => s,
            Source::RaydiumPools(s) => s,
            Source::PumpPortal(s) => s,
            Source::MockFirehose(s) => s,
        }
    }
}

#[async_trait]
impl SourceAdapter for Source {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn run(&self, queue: QueueProducer) -> Result<(), SourceError> {
        self.inner().run(queue).await
    }

    fn stop(&self) {
        self.inner().stop()
    }
}

/// Fill symbol and name from the metadata port.
///
/// Lookup failure or timeout keeps the synthetic `TOKEN_<prefix>` symbol;
/// the candidate is always returned.
pub async fn label_candidate(
    candidate: Candidate,
    metadata: Option<&Arc<dyn MetadataPort>>,
    timeout: Duration,
) -> Candidate {
    let Some(metadata) = metadata else {
        return candidate;
    };

    match tokio::time::timeout(timeout, metadata.lookup(&candidate.mint)).await {
        Ok(Ok(meta)) => {
            let symbol = meta
                .symbol
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| synthetic_symbol(&candidate.mint));
            let name = meta
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| symbol.clone());
            candidate.with_names(symbol, name)
        }
        Ok(Err(e)) => {
            debug!(mint = %candidate.mint, error = %e, "Metadata lookup failed");
            candidate
        }
        Err(_) => {
            debug!(mint = %candidate.mint, timeout_ms = timeout.as_millis() as u64, "Metadata lookup timed out");
            candidate
        }
    }
}
