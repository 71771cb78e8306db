//! Butters Discovery - New-Token Discovery Library
//!
//! Finds freshly created Solana tokens, enriches them through a failover RPC
//! pool and keeps a ranked, TTL-bounded set of candidates.
//!
//! # Modules
//!
//! - `domain`: Candidate model, scoring and admission rules
//! - `ports`: Trait abstractions (TokenDataPort, MetadataPort, Clock)
//! - `adapters`: External implementations (RPC pool, token data, sources, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Queue, engine, cycle scheduler and event log

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
