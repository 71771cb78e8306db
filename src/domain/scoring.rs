//! Candidate Scoring
//!
//! Composite score in [0, 1]:
//!
//! ```text
//! base    = w_nov*novelty + w_liq*liquidity + w_dist*distribution + w_act*activity
//! overall = clamp(base - rug_risk + activity_bonus + momentum_bonus, 0, 1)
//! ```
//!
//! Tier boundaries and weights are configuration; defaults reproduce the
//! production tuning.

use chrono::{DateTime, Utc};

use super::candidate::{Candidate, SubScores};

/// Weights of the four positive sub-scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub novelty: f64,
    pub liquidity: f64,
    pub distribution: f64,
    pub activity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            novelty: 0.25,
            liquidity: 0.20,
            distribution: 0.20,
            activity: 0.35,
        }
    }
}

/// Scoring parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Liquidity floor the liquidity tiers are relative to
    pub min_liq_usd: f64,
    /// Concentration above this drops distribution to its lowest tier
    pub max_top10_share: f64,
    /// Unique buyers at which the buyer term saturates
    pub buyers_saturation: f64,
    /// Buy pressure at which the pressure term saturates
    pub buy_pressure_saturation: f64,
    /// Bonus for a mint reported by two or more sources
    pub multi_source_bonus: f64,
    /// Window in which the second source must report
    pub multi_source_window_secs: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_liq_usd: 3000.0,
            max_top10_share: 0.95,
            buyers_saturation: 50.0,
            buy_pressure_saturation: 1.5,
            multi_source_bonus: 0.02,
            multi_source_window_secs: 60,
        }
    }
}

/// Full result of one scoring pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub scores: SubScores,
    pub base: f64,
    pub activity_bonus: f64,
    pub momentum_bonus: f64,
    pub overall: f64,
}

/// Novelty tiers by age in minutes
pub fn novelty_score(age_minutes: f64) -> f64 {
    if age_minutes < 5.0 {
        1.0
    } else if age_minutes < 15.0 {
        0.8
    } else if age_minutes < 60.0 {
        0.6
    } else {
        0.3
    }
}

/// Saturating liquidity tiers relative to the configured minimum
pub fn liquidity_score(liquidity_usd: f64, min_liq_usd: f64) -> f64 {
    let floor = min_liq_usd.max(1.0);
    let ratio = liquidity_usd / floor;
    if ratio >= 3.0 {
        1.0
    } else if ratio >= 1.5 {
        0.8
    } else if ratio >= 1.0 {
        0.6
    } else {
        0.4
    }
}

/// Distribution tiers; concentration above `max_share` is penalized hardest
pub fn distribution_score(top10_share: f64, max_share: f64) -> f64 {
    if top10_share > max_share {
        0.2
    } else if top10_share <= 0.5 {
        1.0
    } else if top10_share <= 0.7 {
        0.8
    } else {
        0.5
    }
}

/// Activity from unique buyers and buy pressure, normalized to [0, 1]
pub fn activity_score(unique_buyers: u32, buy_pressure: f64, config: &ScoringConfig) -> f64 {
    let buyers = (unique_buyers as f64 / config.buyers_saturation.max(1.0)).min(1.0);
    let pressure = (buy_pressure / config.buy_pressure_saturation.max(f64::EPSILON)).clamp(0.0, 1.0);
    (0.20 * buyers + 0.15 * pressure) / 0.35
}

/// Rug-risk penalty from missing controls and heavy concentration
pub fn rug_risk_score(candidate: &Candidate) -> f64 {
    let mut risk = 0.0;
    if !candidate.authorities_renounced() {
        risk += 0.3;
    }
    if !candidate.lp_protected() {
        risk += 0.2;
    }
    if candidate.top10_holder_share > 0.8 {
        risk += 0.2;
    }
    risk
}

fn activity_bonus(unique_buyers: u32, buys: u32) -> f64 {
    if unique_buyers >= 20 && buys >= 20 {
        0.10
    } else if unique_buyers >= 10 && buys >= 10 {
        0.05
    } else {
        0.0
    }
}

fn momentum_bonus(age_minutes: f64, unique_buyers: u32) -> f64 {
    if age_minutes < 2.0 {
        if unique_buyers >= 5 {
            return 0.05;
        }
    } else if age_minutes < 5.0 && unique_buyers >= 15 {
        return 0.03;
    }
    0.0
}

/// Score a candidate without mutating it
pub fn score(candidate: &Candidate, now: DateTime<Utc>, config: &ScoringConfig) -> ScoreBreakdown {
    let age_minutes = candidate.age_secs(now) / 60.0;
    let scores = SubScores {
        novelty: novelty_score(age_minutes),
        liquidity: liquidity_score(candidate.liquidity_usd, config.min_liq_usd),
        distribution: distribution_score(candidate.top10_holder_share, config.max_top10_share),
        activity: activity_score(candidate.unique_buyers_5m, candidate.buy_pressure(), config),
        rug_risk: rug_risk_score(candidate),
    };

    let w = &config.weights;
    let base = scores.novelty * w.novelty
        + scores.liquidity * w.liquidity
        + scores.distribution * w.distribution
        + scores.activity * w.activity;

    let activity_bonus = activity_bonus(candidate.unique_buyers_5m, candidate.buys_5m);
    let momentum_bonus = momentum_bonus(age_minutes, candidate.unique_buyers_5m);
    let overall = clamp_score(base - scores.rug_risk + activity_bonus + momentum_bonus);

    ScoreBreakdown {
        scores,
        base,
        activity_bonus,
        momentum_bonus,
        overall,
    }
}

/// Score a candidate and store the result on it
pub fn apply(candidate: &mut Candidate, now: DateTime<Utc>, config: &ScoringConfig) -> ScoreBreakdown {
    let breakdown = score(candidate, now, config);
    candidate.scores = breakdown.scores;
    candidate.overall_score = breakdown.overall;
    candidate.last_updated = now;
    breakdown
}

/// Add a bonus while keeping the score in range
pub fn add_bonus(candidate: &mut Candidate, bonus: f64) {
    candidate.overall_score = clamp_score(candidate.overall_score + bonus);
}

/// Clamp into [0, 1]; NaN maps to 0
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Effective minimum score from recent history: `max(base, min(q80, base + cap))`.
///
/// Fewer than ten samples fall back to `base`.
pub fn dynamic_threshold(history: &[f64], base: f64, cap: f64) -> f64 {
    let q80 = if history.len() < 10 {
        base
    } else {
        let mut sorted = history.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((0.8 * sorted.len() as f64) as usize).min(sorted.len() - 1);
        sorted[idx]
    };
    base.max(q80.min(base + cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::{Evidence, SOURCE_MOCK_FIREHOSE};
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn fresh_candidate(now: DateTime<Utc>) -> Candidate {
        Candidate::stub("mint", SOURCE_MOCK_FIREHOSE, Evidence::Initialize, now)
    }

    fn safe_candidate(now: DateTime<Utc>) -> Candidate {
        let mut c = fresh_candidate(now);
        c.liquidity_usd = 12_000.0;
        c.top10_holder_share = 0.4;
        c.mint_authority_renounced = true;
        c.freeze_authority_renounced = true;
        c.lp_burned = true;
        c.unique_buyers_5m = 50;
        c.buys_5m = 30;
        c.sells_5m = 0;
        c
    }

    #[test]
    fn test_novelty_tiers() {
        assert_eq!(novelty_score(0.0), 1.0);
        assert_eq!(novelty_score(10.0), 0.8);
        assert_eq!(novelty_score(30.0), 0.6);
        assert_eq!(novelty_score(120.0), 0.3);
    }

    #[test]
    fn test_liquidity_saturates_relative_to_min() {
        assert_eq!(liquidity_score(100.0, 3000.0), 0.4);
        assert_eq!(liquidity_score(3000.0, 3000.0), 0.6);
        assert_eq!(liquidity_score(5000.0, 3000.0), 0.8);
        assert_eq!(liquidity_score(9000.0, 3000.0), 1.0);
        assert_eq!(liquidity_score(1_000_000.0, 3000.0), 1.0);
    }

    #[test]
    fn test_distribution_penalizes_above_max() {
        assert_eq!(distribution_score(0.3, 0.95), 1.0);
        assert_eq!(distribution_score(0.6, 0.95), 0.8);
        assert_eq!(distribution_score(0.9, 0.95), 0.5);
        assert_eq!(distribution_score(0.97, 0.95), 0.2);
    }

    #[test]
    fn test_rug_risk_components() {
        let now = Utc::now();
        let c = fresh_candidate(now);
        assert_relative_eq!(rug_risk_score(&c), 0.7, epsilon = 1e-9);
        assert_relative_eq!(rug_risk_score(&safe_candidate(now)), 0.0);
    }

    #[test]
    fn test_safe_active_candidate_saturates() {
        let now = Utc::now();
        let breakdown = score(&safe_candidate(now), now, &ScoringConfig::default());
        // buy share tops out at 1.0, below the 1.5 saturation point
        assert_relative_eq!(breakdown.base, 0.95, epsilon = 1e-9);
        assert_eq!(breakdown.overall, 1.0);
        assert_eq!(breakdown.activity_bonus, 0.10);
        assert_eq!(breakdown.momentum_bonus, 0.05);
    }

    #[test]
    fn test_overall_is_clamped_at_zero() {
        let now = Utc::now();
        let mut c = fresh_candidate(now - Duration::hours(3));
        c.buy_sell_ratio = 0.0;
        let breakdown = score(&c, now, &ScoringConfig::default());
        assert!(breakdown.base < breakdown.scores.rug_risk);
        assert_eq!(breakdown.overall, 0.0);
    }

    #[test]
    fn test_apply_sets_fields() {
        let now = Utc::now();
        let mut c = safe_candidate(now);
        let breakdown = apply(&mut c, now, &ScoringConfig::default());
        assert_eq!(c.overall_score, breakdown.overall);
        assert_eq!(c.scores, breakdown.scores);
    }

    #[test]
    fn test_add_bonus_clamps() {
        let now = Utc::now();
        let mut c = fresh_candidate(now);
        c.overall_score = 0.99;
        add_bonus(&mut c, 0.02);
        assert_eq!(c.overall_score, 1.0);
    }

    #[test]
    fn test_dynamic_threshold() {
        assert_eq!(dynamic_threshold(&[0.9; 5], 0.52, 0.10), 0.52);

        let high: Vec<f64> = (0..20).map(|_| 0.9).collect();
        assert_relative_eq!(dynamic_threshold(&high, 0.52, 0.10), 0.62, epsilon = 1e-9);

        let low: Vec<f64> = (0..20).map(|_| 0.1).collect();
        assert_eq!(dynamic_threshold(&low, 0.52, 0.10), 0.52);
    }
}
