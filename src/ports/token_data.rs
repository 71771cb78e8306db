//! Token data ports
//!
//! Traits the engine and source adapters use to reach on-chain data. The
//! production implementation goes through the RPC pool; tests plug in mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from token data lookups
#[derive(Debug, Error)]
pub enum TokenDataError {
    #[error("RPC failure: {0}")]
    Rpc(String),

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Invalid account data: {0}")]
    InvalidData(String),

    #[error("Lookup timed out after {0}ms")]
    Timeout(u64),
}

/// On-chain facts used to enrich a candidate.
///
/// `None` means the source could not tell; the engine keeps whatever the
/// candidate already carries for that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnChainSnapshot {
    pub decimals: Option<u8>,
    pub mint_authority_renounced: Option<bool>,
    pub freeze_authority_renounced: Option<bool>,
    pub top10_holder_share: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub lp_locked: Option<bool>,
    pub lp_burned: Option<bool>,
    pub unique_buyers: Option<u32>,
    pub buy_sell_ratio: Option<f64>,
}

/// Display metadata for a token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
}

/// Enrichment reads for the scoring engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenDataPort: Send + Sync {
    /// Fetch authority, supply distribution and pool facts for a mint
    async fn fetch_snapshot(&self, mint: &str) -> Result<OnChainSnapshot, TokenDataError>;
}

/// Symbol/name lookup used by source adapters before enqueueing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataPort: Send + Sync {
    async fn lookup(&self, mint: &str) -> Result<AssetMetadata, TokenDataError>;
}
