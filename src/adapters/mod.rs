//! Adapters Layer - External System Implementations
//!
//! - RPC Pool: failover over a static list of RPC endpoints
//! - Token Data: on-chain reads and asset metadata through the pool
//! - Sources: streaming new-token feeds
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod rpc_pool;
pub mod sources;
pub mod token_data;

pub use cli::CliApp;
pub use rpc_pool::{PoolStatus, RpcPool, RpcPoolError};
pub use sources::{Source, SourceAdapter, SourceError};
pub use token_data::TokenDataClient;
