//! Candidate Token
//!
//! A newly observed token under evaluation. Sources create minimal stubs, the
//! engine enriches, scores and ranks them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default SPL token decimals when nothing better is known
pub const DEFAULT_DECIMALS: u8 = 9;

/// Source tags used across adapters and the fresh-pass allowlist
pub const SOURCE_HELIUS_LOGS: &str = "helius_logs";
pub const SOURCE_RAYDIUM_POOLS: &str = "raydium_pools";
pub const SOURCE_PUMPPORTAL_WS: &str = "pumpportal_ws";
pub const SOURCE_MOCK_FIREHOSE: &str = "mock_firehose";

/// Strength of the observation that produced a candidate id.
///
/// An explicit mint-initialize instruction is authoritative; an id scraped from
/// balance changes or log lines is only a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Heuristic,
    Initialize,
}

impl Evidence {
    /// True if `self` should replace an observation recorded with `previous`
    pub fn supersedes(self, previous: Evidence) -> bool {
        self > previous
    }
}

/// Component scores, each in [0, 1] except `rug_risk` which is a penalty
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub novelty: f64,
    pub liquidity: f64,
    pub distribution: f64,
    pub activity: f64,
    pub rug_risk: f64,
}

/// A token under evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Mint address, the key everywhere
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub pool_address: Option<String>,

    // Market
    pub liquidity_usd: f64,
    pub top10_holder_share: f64,
    pub unique_buyers_5m: u32,
    pub buys_5m: u32,
    pub sells_5m: u32,
    pub buy_sell_ratio: f64,

    // Security
    pub mint_authority_renounced: bool,
    pub freeze_authority_renounced: bool,
    pub lp_locked: bool,
    pub lp_burned: bool,

    // Derived
    pub scores: SubScores,
    pub overall_score: f64,
    pub source: String,
    pub evidence: Evidence,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Whether the candidate passed admission on its last evaluation
    #[serde(default)]
    pub admitted: bool,

    /// Source-specific metadata (signature, program id, hints)
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Candidate {
    /// Create a minimal stub as emitted by a source adapter
    pub fn stub(
        mint: impl Into<String>,
        source: impl Into<String>,
        evidence: Evidence,
        first_seen: DateTime<Utc>,
    ) -> Self {
        let mint = mint.into();
        let symbol = synthetic_symbol(&mint);
        Self {
            name: symbol.clone(),
            symbol,
            mint,
            decimals: DEFAULT_DECIMALS,
            pool_address: None,
            liquidity_usd: 0.0,
            top10_holder_share: 1.0,
            unique_buyers_5m: 0,
            buys_5m: 0,
            sells_5m: 0,
            buy_sell_ratio: 1.0,
            mint_authority_renounced: false,
            freeze_authority_renounced: false,
            lp_locked: false,
            lp_burned: false,
            scores: SubScores::default(),
            overall_score: 0.0,
            source: source.into(),
            evidence,
            first_seen,
            last_updated: first_seen,
            admitted: false,
            extra: Map::new(),
        }
    }

    /// Set symbol and name in one go
    pub fn with_names(mut self, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self.name = name.into();
        self
    }

    /// Attach a metadata value
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Age relative to `now`, never negative
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.first_seen).num_milliseconds();
        (millis.max(0) as f64) / 1000.0
    }

    /// Both authorities renounced
    pub fn authorities_renounced(&self) -> bool {
        self.mint_authority_renounced && self.freeze_authority_renounced
    }

    /// LP locked or burned
    pub fn lp_protected(&self) -> bool {
        self.lp_locked || self.lp_burned
    }

    /// Total trades observed in the activity window
    pub fn trade_count(&self) -> u32 {
        self.buys_5m.saturating_add(self.sells_5m)
    }

    /// Buy pressure used by activity scoring.
    ///
    /// Uses the observed buy share when trades were seen, otherwise the
    /// enrichment-provided buy/sell ratio.
    pub fn buy_pressure(&self) -> f64 {
        let total = self.trade_count();
        if total > 0 {
            self.buys_5m as f64 / total as f64
        } else {
            self.buy_sell_ratio.max(0.0)
        }
    }

    /// Liquidity hint carried in `extra` by sources that know it
    pub fn liquidity_hint(&self) -> Option<f64> {
        self.extra.get("liq_hint").and_then(Value::as_f64)
    }

    /// Record that `source` has also reported this mint
    pub fn note_seen_from(&mut self, source: &str) {
        let entry = self
            .extra
            .entry("seen_from".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            if !list.iter().any(|v| v.as_str() == Some(source)) {
                list.push(Value::String(source.to_string()));
            }
        }
    }

    /// Merge a re-observation of the same mint.
    ///
    /// Keeps the earliest first-seen. Descriptive fields are taken from `other`
    /// only when it carries stronger evidence.
    pub fn absorb(&mut self, other: Candidate) {
        if other.first_seen < self.first_seen {
            self.first_seen = other.first_seen;
        }
        if other.last_updated > self.last_updated {
            self.last_updated = other.last_updated;
        }
        if other.evidence.supersedes(self.evidence) {
            self.evidence = other.evidence;
            self.symbol = other.symbol;
            self.name = other.name;
            self.decimals = other.decimals;
            if other.pool_address.is_some() {
                self.pool_address = other.pool_address;
            }
        }
        for (key, value) in other.extra {
            self.extra.entry(key).or_insert(value);
        }
    }
}

/// Fallback symbol derived from the mint prefix
pub fn synthetic_symbol(mint: &str) -> String {
    let prefix: String = mint.chars().take(8).collect();
    format!("TOKEN_{}", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_stub_defaults_are_conservative() {
        let c = Candidate::stub("So1anaMint11111111111", SOURCE_HELIUS_LOGS, Evidence::Heuristic, now());
        assert_eq!(c.symbol, "TOKEN_So1anaMi");
        assert_eq!(c.decimals, DEFAULT_DECIMALS);
        assert!(!c.authorities_renounced());
        assert!(!c.lp_protected());
        assert_eq!(c.top10_holder_share, 1.0);
        assert!(!c.admitted);
    }

    #[test]
    fn test_evidence_ordering() {
        assert!(Evidence::Initialize.supersedes(Evidence::Heuristic));
        assert!(!Evidence::Heuristic.supersedes(Evidence::Initialize));
        assert!(!Evidence::Heuristic.supersedes(Evidence::Heuristic));
    }

    #[test]
    fn test_age_never_negative() {
        let c = Candidate::stub("m", SOURCE_MOCK_FIREHOSE, Evidence::Heuristic, now());
        assert_eq!(c.age_secs(now() - Duration::seconds(10)), 0.0);
        assert_eq!(c.age_secs(now() + Duration::seconds(90)), 90.0);
    }

    #[test]
    fn test_absorb_keeps_first_seen_and_upgrades_evidence() {
        let mut weak = Candidate::stub("mint", SOURCE_HELIUS_LOGS, Evidence::Heuristic, now());
        let strong = Candidate::stub(
            "mint",
            SOURCE_PUMPPORTAL_WS,
            Evidence::Initialize,
            now() + Duration::seconds(5),
        )
        .with_names("PEPE", "Pepe");

        weak.absorb(strong);
        assert_eq!(weak.first_seen, now());
        assert_eq!(weak.evidence, Evidence::Initialize);
        assert_eq!(weak.symbol, "PEPE");
    }

    #[test]
    fn test_absorb_weaker_does_not_overwrite() {
        let mut strong = Candidate::stub("mint", SOURCE_PUMPPORTAL_WS, Evidence::Initialize, now())
            .with_names("PEPE", "Pepe");
        let weak = Candidate::stub("mint", SOURCE_HELIUS_LOGS, Evidence::Heuristic, now());

        strong.absorb(weak);
        assert_eq!(strong.symbol, "PEPE");
        assert_eq!(strong.evidence, Evidence::Initialize);
    }

    #[test]
    fn test_buy_pressure_prefers_observed_trades() {
        let mut c = Candidate::stub("m", SOURCE_MOCK_FIREHOSE, Evidence::Heuristic, now());
        c.buy_sell_ratio = 1.4;
        assert_eq!(c.buy_pressure(), 1.4);

        c.buys_5m = 3;
        c.sells_5m = 1;
        assert_eq!(c.buy_pressure(), 0.75);
    }

    #[test]
    fn test_note_seen_from_dedups() {
        let mut c = Candidate::stub("m", SOURCE_MOCK_FIREHOSE, Evidence::Heuristic, now());
        c.note_seen_from("a");
        c.note_seen_from("b");
        c.note_seen_from("a");
        assert_eq!(c.extra["seen_from"].as_array().unwrap().len(), 2);
    }
}
