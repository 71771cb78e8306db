//! Token Data Adapter
//!
//! On-chain reads used to enrich discovery candidates, routed through the
//! RPC endpoint pool:
//! - Mint authority / freeze authority status (renounced = safer)
//! - Decimals and supply
//! - Top-10 holder concentration
//! - Symbol and name via DAS `getAsset`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use butters_discovery::adapters::rpc_pool::RpcPool;
//! use butters_discovery::adapters::token_data::TokenDataClient;
//! use butters_discovery::ports::TokenDataPort;
//!
//! let pool = Arc::new(RpcPool::with_defaults(vec!["https://api.mainnet-beta.solana.com".into()])?);
//! let client = TokenDataClient::new(pool)?;
//! let snapshot = client.fetch_snapshot("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263").await?;
//! println!("top10 share: {:?}", snapshot.top10_holder_share);
//! ```

mod client;
mod types;

pub use client::{TokenDataClient, TokenDataConfig};
pub use types::{top10_share, DasAsset, LargestAccount, MintInfo};
