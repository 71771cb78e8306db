//! Admission Filters
//!
//! Decides whether a scored candidate may appear in ranked output. Every
//! candidate is scored and cached regardless; admission only gates ranking.
//!
//! Candidates inside the freshness window get looser liquidity and
//! concentration limits, and those from streaming sources with live trade
//! data may meet a reduced activity requirement.

use std::fmt;

use super::candidate::{Candidate, SOURCE_HELIUS_LOGS, SOURCE_PUMPPORTAL_WS};

/// Admission thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    pub min_liq_usd: f64,
    pub min_liq_fresh_usd: f64,
    pub max_top10_share: f64,
    pub max_top10_share_fresh: f64,
    pub score_threshold: f64,
    /// Tolerance below `score_threshold` that still admits
    pub min_score_cap_delta: f64,
    pub fresh_window_secs: f64,
    pub candidate_ttl_secs: f64,
    /// Reduced activity requirement inside the freshness window
    pub trade_min_unique_buyers: u32,
    pub trade_min_trades: u32,
    /// Activity requirement outside the concession
    pub mature_min_unique_buyers: u32,
    pub fresh_pass_enabled: bool,
    /// Sources eligible for the fresh-pass concession
    pub fresh_sources: Vec<String>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_liq_usd: 3000.0,
            min_liq_fresh_usd: 1200.0,
            max_top10_share: 0.95,
            max_top10_share_fresh: 0.98,
            score_threshold: 0.65,
            min_score_cap_delta: 0.10,
            fresh_window_secs: 90.0,
            candidate_ttl_secs: 600.0,
            trade_min_unique_buyers: 3,
            trade_min_trades: 5,
            mature_min_unique_buyers: 5,
            fresh_pass_enabled: true,
            fresh_sources: vec![SOURCE_PUMPPORTAL_WS.to_string(), SOURCE_HELIUS_LOGS.to_string()],
        }
    }
}

impl AdmissionConfig {
    /// Lowest score that can still be admitted
    pub fn score_floor(&self) -> f64 {
        self.score_threshold - self.min_score_cap_delta
    }

    /// Liquidity floor for the given age bucket
    pub fn liquidity_floor(&self, bucket: AgeBucket) -> f64 {
        match bucket {
            AgeBucket::Fresh => self.min_liq_fresh_usd,
            AgeBucket::Mature => self.min_liq_usd,
        }
    }

    /// Concentration ceiling for the given age bucket
    pub fn concentration_ceiling(&self, bucket: AgeBucket) -> f64 {
        match bucket {
            AgeBucket::Fresh => self.max_top10_share_fresh,
            AgeBucket::Mature => self.max_top10_share,
        }
    }

    pub fn bucket(&self, age_secs: f64) -> AgeBucket {
        if age_secs <= self.fresh_window_secs {
            AgeBucket::Fresh
        } else {
            AgeBucket::Mature
        }
    }

    fn fresh_pass_source(&self, source: &str) -> bool {
        self.fresh_pass_enabled && self.fresh_sources.iter().any(|s| s == source)
    }
}

/// Age classification driving which thresholds apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBucket {
    Fresh,
    Mature,
}

/// Why a candidate was kept out of ranked output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Expired,
    LowLiquidity,
    ConcentratedHolders,
    LowActivity,
    LowScore,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Expired => "expired",
            RejectReason::LowLiquidity => "low_liq",
            RejectReason::ConcentratedHolders => "concentrated_holders",
            RejectReason::LowActivity => "low_activity",
            RejectReason::LowScore => "low_score",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when the reduced fresh-window activity rule is satisfied
pub fn fresh_concession_met(candidate: &Candidate, age_secs: f64, config: &AdmissionConfig) -> bool {
    config.bucket(age_secs) == AgeBucket::Fresh
        && config.fresh_pass_source(&candidate.source)
        && (candidate.unique_buyers_5m >= config.trade_min_unique_buyers
            || candidate.trade_count() >= config.trade_min_trades)
}

/// Run all filters; returns the bucket the candidate was judged in
pub fn evaluate(
    candidate: &Candidate,
    age_secs: f64,
    config: &AdmissionConfig,
) -> Result<AgeBucket, RejectReason> {
    if age_secs >= config.candidate_ttl_secs {
        return Err(RejectReason::Expired);
    }

    let bucket = config.bucket(age_secs);

    if candidate.liquidity_usd < config.liquidity_floor(bucket) {
        return Err(RejectReason::LowLiquidity);
    }

    if candidate.top10_holder_share > config.concentration_ceiling(bucket) {
        return Err(RejectReason::ConcentratedHolders);
    }

    let activity_ok = fresh_concession_met(candidate, age_secs, config)
        || candidate.unique_buyers_5m >= config.mature_min_unique_buyers;
    if !activity_ok {
        return Err(RejectReason::LowActivity);
    }

    if candidate.overall_score < config.score_floor() {
        return Err(RejectReason::LowScore);
    }

    Ok(bucket)
}
