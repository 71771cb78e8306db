//! Domain Layer - Core discovery logic
//!
//! Pure types and scoring rules with no I/O. All external interactions
//! happen through the ports layer.
//!
//! - `candidate`: the token under evaluation and its merge rules
//! - `trade_stats`: per-mint trade activity folded from streamed trades
//! - `scoring`: sub-scores, bonuses and the dynamic threshold
//! - `admission`: the filters a candidate must pass to be ranked
//! - `known_programs`: program ids and quote mints that are never new tokens

pub mod candidate;
pub mod trade_stats;
pub mod scoring;
pub mod admission;
pub mod known_programs;

pub use candidate::{
    synthetic_symbol, Candidate, Evidence, SubScores, DEFAULT_DECIMALS, SOURCE_HELIUS_LOGS,
    SOURCE_MOCK_FIREHOSE, SOURCE_PUMPPORTAL_WS, SOURCE_RAYDIUM_POOLS,
};
pub use trade_stats::{TradeSide, TradeStats, TradeUpdate};
pub use scoring::{ScoreBreakdown, ScoringConfig, ScoringWeights};
pub use admission::{AdmissionConfig, AgeBucket, RejectReason};
pub use known_programs::{is_address_shaped, is_known_non_token, is_plausible_mint};
