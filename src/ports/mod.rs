//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Wall-clock time (so candidate TTLs can be tested without sleeping)
//! - On-chain enrichment reads (authorities, holder distribution)
//! - Token metadata lookup (symbol/name)

pub mod clock;
pub mod token_data;
pub mod mocks;

pub use clock::{Clock, SystemClock};
pub use token_data::{AssetMetadata, MetadataPort, OnChainSnapshot, TokenDataError, TokenDataPort};
