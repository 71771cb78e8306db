//! Discovery Engine
//!
//! Drains the candidate queue once per cycle, enriches new candidates
//! through the token data port, scores them and maintains the ranked set.
//!
//! Per cycle:
//! 1. Purge expired candidates
//! 2. Drain up to `batch_size` queue items
//! 3. Fold trade updates into per-mint stats
//! 4. Enrich new or upgraded candidates concurrently, each under a timeout
//! 5. Score, apply admission, cap the ranked set

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::freshness::{FreshnessCache, Sighting, DEFAULT_MAX_ENTRIES};
use super::queue::{QueueConsumer, QueueItem};
use crate::domain::admission::{self, AdmissionConfig, AgeBucket, RejectReason};
use crate::domain::scoring::{self, ScoringConfig};
use crate::domain::{Candidate, TradeStats, SOURCE_MOCK_FIREHOSE};
use crate::ports::{Clock, OnChainSnapshot, TokenDataPort};

/// Default number of queue items handled per cycle
pub const DEFAULT_BATCH_SIZE: usize = 256;
/// Default enrichment fan-out
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 8;
/// Default per-candidate enrichment timeout
pub const DEFAULT_ENRICH_TIMEOUT_MS: u64 = 3000;
/// Default ranked set size
pub const DEFAULT_MAX_CANDIDATES: usize = 100;
/// Scores kept for the dynamic threshold
pub const SCORE_HISTORY_LEN: usize = 500;
/// Enrichment failure recorded for lookups cut short by `stop()`
pub const ENRICH_CANCELLED: &str = "cancelled";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine stopped")]
    Stopped,

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub enrich_concurrency: usize,
    pub enrich_timeout: Duration,
    pub max_candidates: usize,
    pub scoring: ScoringConfig,
    pub admission: AdmissionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            enrich_concurrency: DEFAULT_ENRICH_CONCURRENCY,
            enrich_timeout: Duration::from_millis(DEFAULT_ENRICH_TIMEOUT_MS),
            max_candidates: DEFAULT_MAX_CANDIDATES,
            scoring: ScoringConfig::default(),
            admission: AdmissionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.enrich_concurrency == 0 {
            return Err(EngineError::InvalidConfig("enrich_concurrency must be > 0".into()));
        }
        if self.max_candidates == 0 {
            return Err(EngineError::InvalidConfig("max_candidates must be > 0".into()));
        }
        if self.admission.candidate_ttl_secs <= 0.0 {
            return Err(EngineError::InvalidConfig("candidate_ttl_sec must be > 0".into()));
        }
        Ok(())
    }
}

/// Result of one analysis cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub tokens_scanned: usize,
    pub tokens_admitted: usize,
    pub errors: usize,
    pub duplicates: usize,
    /// Ranked candidates at or above the full score threshold
    pub hot: usize,
    /// Queue drops since the previous cycle
    pub queue_dropped: u64,
    /// Dynamic score floor after this cycle's scores
    pub min_score_effective: f64,
    /// Candidates finalized this cycle but kept out of ranking, per reason
    pub rejected: BTreeMap<&'static str, usize>,
    pub duration_ms: u64,
}

impl CycleSummary {
    fn record(&mut self, outcome: Result<AgeBucket, RejectReason>) {
        match outcome {
            Ok(_) => self.tokens_admitted += 1,
            Err(reason) => *self.rejected.entry(reason.as_str()).or_default() += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub queue_dropped: u64,
    pub tracked: usize,
    pub admitted: usize,
    pub cache_size: usize,
    pub cycles: u64,
}

#[derive(Debug, Clone)]
struct Tracked {
    candidate: Candidate,
    /// Earliest sighting per source
    sources: HashMap<String, DateTime<Utc>>,
}

enum Enrichment {
    Skipped,
    Snapshot(OnChainSnapshot),
    Failed(String),
}

pub struct DiscoveryEngine {
    config: EngineConfig,
    queue: QueueConsumer,
    token_data: Option<Arc<dyn TokenDataPort>>,
    clock: Arc<dyn Clock>,
    freshness: FreshnessCache,
    tracked: HashMap<String, Tracked>,
    trades: HashMap<String, TradeStats>,
    score_history: VecDeque<f64>,
    cycles: u64,
    last_dropped: u64,
    cancel: CancellationToken,
}

impl DiscoveryEngine {
    pub fn new(config: EngineConfig, queue: QueueConsumer, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        config.validate()?;
        let ttl = chrono::Duration::milliseconds((config.admission.candidate_ttl_secs * 1000.0) as i64);
        Ok(Self {
            freshness: FreshnessCache::with_config(ttl, ttl, DEFAULT_MAX_ENTRIES),
            config,
            queue,
            token_data: None,
            clock,
            tracked: HashMap::new(),
            trades: HashMap::new(),
            score_history: VecDeque::with_capacity(SCORE_HISTORY_LEN),
            cycles: 0,
            last_dropped: 0,
            cancel: CancellationToken::new(),
        })
    }

    /// Enrich candidates through `port`; without one, stubs are scored as-is
    pub fn with_token_data(mut self, port: Arc<dyn TokenDataPort>) -> Self {
        self.token_data = Some(port);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that `stop()` cancels; lets callers stop the engine without its lock
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one analysis cycle
    pub async fn run_analysis_cycle(&mut self) -> Result<CycleSummary, EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Stopped);
        }
        let started = tokio::time::Instant::now();
        let now = self.clock.now();
        let purged = self.purge_expired(now);

        let mut summary = CycleSummary::default();
        let mut pending: HashMap<String, Candidate> = HashMap::new();
        let mut traded: HashSet<String> = HashSet::new();

        for item in self.queue.drain(self.config.batch_size) {
            match item {
                QueueItem::Trade(update) => {
                    self.trades.entry(update.mint.clone()).or_default().record(&update);
                    traded.insert(update.mint);
                }
                QueueItem::Candidate(candidate) => {
                    summary.tokens_scanned += 1;
                    self.ingest(candidate, now, &mut pending, &mut summary);
                }
            }
        }

        let enriched = self.enrich_all(pending.into_values().collect()).await;
        let mut finalized: HashSet<String> = HashSet::new();
        let mut cancelled = 0usize;
        for (mut candidate, outcome) in enriched {
            match outcome {
                Enrichment::Skipped => {}
                Enrichment::Snapshot(snapshot) => apply_snapshot(&mut candidate, &snapshot),
                Enrichment::Failed(error) => {
                    summary.errors += 1;
                    if error == ENRICH_CANCELLED {
                        cancelled += 1;
                    } else {
                        warn!(mint = %candidate.mint, error = %error, "Enrichment failed, using conservative defaults");
                    }
                    apply_risk_defaults(&mut candidate);
                }
            }
            finalized.insert(candidate.mint.clone());
            let outcome = self.finalize(candidate, now);
            summary.record(outcome);
        }

        if cancelled > 0 {
            warn!(cancelled, "Engine stopped mid-cycle, remaining candidates kept with conservative defaults");
        }

        // trade activity can newly satisfy the fresh-window rule
        for mint in traded.difference(&finalized) {
            let Some(entry) = self.tracked.get(mint) else {
                continue;
            };
            let candidate = entry.candidate.clone();
            let outcome = self.finalize(candidate, now);
            summary.record(outcome);
        }

        self.enforce_capacity();

        let dropped = self.queue.dropped();
        summary.queue_dropped = dropped.saturating_sub(self.last_dropped);
        self.last_dropped = dropped;
        summary.hot = self
            .tracked
            .values()
            .map(|t| &t.candidate)
            .filter(|c| self.admitted_now(c, now) && c.overall_score >= self.config.admission.score_threshold)
            .count();
        summary.min_score_effective = self.dynamic_min_score();
        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.cycles += 1;

        info!(
            cycle = self.cycles,
            scanned = summary.tokens_scanned,
            admitted = summary.tokens_admitted,
            duplicates = summary.duplicates,
            errors = summary.errors,
            hot = summary.hot,
            purged,
            queue_dropped = summary.queue_dropped,
            min_score_effective = summary.min_score_effective,
            rejected = ?summary.rejected,
            duration_ms = summary.duration_ms,
            "Analysis cycle complete"
        );
        Ok(summary)
    }

    /// Record a sighting; new or upgraded candidates go to `pending`
    fn ingest(
        &mut self,
        mut candidate: Candidate,
        now: DateTime<Utc>,
        pending: &mut HashMap<String, Candidate>,
        summary: &mut CycleSummary,
    ) {
        let mint = candidate.mint.clone();
        let seen_at = candidate.first_seen.min(now);
        let sighting = self.freshness.observe(&mint, seen_at, now);

        if let Some(entry) = self.tracked.get_mut(&mint) {
            entry.sources.entry(candidate.source.clone()).or_insert(seen_at);
            entry.candidate.note_seen_from(&candidate.source);
            if candidate.evidence.supersedes(entry.candidate.evidence) {
                debug!(mint = %mint, evidence = ?candidate.evidence, "Stronger evidence, re-enriching");
                let mut upgraded = entry.candidate.clone();
                upgraded.absorb(candidate);
                pending.insert(mint, upgraded);
            } else {
                summary.duplicates += 1;
            }
            return;
        }

        if let Some(existing) = pending.get_mut(&mint) {
            existing.note_seen_from(&candidate.source);
            existing.absorb(candidate);
            summary.duplicates += 1;
            return;
        }

        if let Sighting::Repeat { first_seen } = sighting {
            candidate.first_seen = first_seen;
        } else {
            candidate.first_seen = seen_at;
        }
        let source = candidate.source.clone();
        candidate.note_seen_from(&source);
        pending.insert(mint, candidate);
    }

    /// Enrich concurrently. Once the engine is cancelled, in-flight and
    /// not-yet-started lookups resolve to `Failed("cancelled")`.
    async fn enrich_all(&self, candidates: Vec<Candidate>) -> Vec<(Candidate, Enrichment)> {
        let timeout = self.config.enrich_timeout;
        stream::iter(candidates)
            .map(|candidate| {
                let port = self.token_data.clone();
                let cancel = self.cancel.clone();
                async move {
                    let outcome = match port {
                        // synthetic mints have nothing on chain
                        Some(_) if candidate.source == SOURCE_MOCK_FIREHOSE => Enrichment::Skipped,
                        None => Enrichment::Skipped,
                        Some(port) => tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Enrichment::Failed(ENRICH_CANCELLED.to_string()),
                            res = tokio::time::timeout(timeout, port.fetch_snapshot(&candidate.mint)) => match res {
                                Ok(Ok(snapshot)) => Enrichment::Snapshot(snapshot),
                                Ok(Err(e)) => Enrichment::Failed(e.to_string()),
                                Err(_) => Enrichment::Failed(format!("timed out after {}ms", timeout.as_millis())),
                            },
                        },
                    };
                    (candidate, outcome)
                }
            })
            .buffer_unordered(self.config.enrich_concurrency)
            .collect()
            .await
    }

    /// Fold trades, score, admit and store. Returns the admission outcome.
    fn finalize(&mut self, mut candidate: Candidate, now: DateTime<Utc>) -> Result<AgeBucket, RejectReason> {
        if let Some(stats) = self.trades.get(&candidate.mint) {
            apply_trade_stats(&mut candidate, stats);
        }

        scoring::apply(&mut candidate, now, &self.config.scoring);

        let mut sources = self
            .tracked
            .get(&candidate.mint)
            .map(|t| t.sources.clone())
            .unwrap_or_default();
        sources.entry(candidate.source.clone()).or_insert(candidate.first_seen);
        if multi_source(&sources, self.config.scoring.multi_source_window_secs) {
            scoring::add_bonus(&mut candidate, self.config.scoring.multi_source_bonus);
        }

        let age = candidate.age_secs(now);
        let outcome = admission::evaluate(&candidate, age, &self.config.admission);
        match outcome {
            Ok(bucket) => debug!(mint = %candidate.mint, score = candidate.overall_score, ?bucket, "Admitted"),
            Err(reason) => debug!(mint = %candidate.mint, score = candidate.overall_score, %reason, "Not admitted"),
        }
        candidate.admitted = outcome.is_ok();

        if self.score_history.len() >= SCORE_HISTORY_LEN {
            self.score_history.pop_front();
        }
        self.score_history.push_back(candidate.overall_score);

        self.freshness.mark_read(&candidate.mint, now);
        self.tracked
            .insert(candidate.mint.clone(), Tracked { candidate, sources });
        outcome
    }

    /// Admission re-checked at the current age; fresh-window concessions lapse
    fn admitted_now(&self, candidate: &Candidate, now: DateTime<Utc>) -> bool {
        candidate.admitted && admission::evaluate(candidate, candidate.age_secs(now), &self.config.admission).is_ok()
    }

    /// Drop the lowest-scored, then oldest, admitted candidates beyond the cap
    fn enforce_capacity(&mut self) {
        let mut admitted: Vec<(f64, DateTime<Utc>, String)> = self
            .tracked
            .values()
            .filter(|t| t.candidate.admitted)
            .map(|t| (t.candidate.overall_score, t.candidate.first_seen, t.candidate.mint.clone()))
            .collect();
        if admitted.len() <= self.config.max_candidates {
            return;
        }
        admitted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let excess = admitted.len() - self.config.max_candidates;
        for (score, _, mint) in admitted.into_iter().take(excess) {
            debug!(mint = %mint, score, "Evicted from ranked set");
            self.tracked.remove(&mint);
        }
    }

    /// Remove candidates past their TTL; returns how many went
    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.admission.candidate_ttl_secs;
        let before = self.tracked.len();
        self.tracked.retain(|_, t| t.candidate.age_secs(now) < ttl);
        self.freshness.sweep(now);

        let tracked = &self.tracked;
        let horizon = now - chrono::Duration::milliseconds((ttl * 1000.0) as i64);
        self.trades.retain(|mint, stats| {
            tracked.contains_key(mint) || stats.last_ts.map_or(false, |ts| ts > horizon)
        });
        before - self.tracked.len()
    }

    /// Score floor derived from recent score history
    pub fn dynamic_min_score(&self) -> f64 {
        let history: Vec<f64> = self.score_history.iter().copied().collect();
        let adm = &self.config.admission;
        scoring::dynamic_threshold(&history, adm.score_floor(), adm.min_score_cap_delta)
    }

    /// Up to `k` admitted candidates scoring at least `min_score`
    /// (the dynamic threshold when `None`), best first.
    pub fn best_candidates(&mut self, k: usize, min_score: Option<f64>) -> Vec<Candidate> {
        let now = self.clock.now();
        self.purge_expired(now);
        let threshold = min_score.unwrap_or_else(|| self.dynamic_min_score());

        let mut ranked: Vec<Candidate> = self
            .tracked
            .values()
            .map(|t| &t.candidate)
            .filter(|c| c.overall_score >= threshold && self.admitted_now(c, now))
            .cloned()
            .collect();
        ranked.sort_by(|a, b| {
            b.overall_score
                .total_cmp(&a.overall_score)
                .then(b.first_seen.cmp(&a.first_seen))
        });
        ranked.truncate(k);

        for c in &ranked {
            self.freshness.mark_read(&c.mint, now);
        }
        ranked
    }

    /// Tracked candidate by mint, if live
    pub fn get(&self, mint: &str) -> Option<&Candidate> {
        let now = self.clock.now();
        self.tracked
            .get(mint)
            .map(|t| &t.candidate)
            .filter(|c| c.age_secs(now) < self.config.admission.candidate_ttl_secs)
    }

    pub fn stats(&self) -> EngineStats {
        let now = self.clock.now();
        let queue = self.queue.stats();
        EngineStats {
            queue_len: queue.len,
            queue_capacity: queue.capacity,
            queue_dropped: queue.dropped,
            tracked: self.tracked.len(),
            admitted: self
                .tracked
                .values()
                .filter(|t| self.admitted_now(&t.candidate, now))
                .count(),
            cache_size: self.freshness.len(),
            cycles: self.cycles,
        }
    }
}

/// Copy known on-chain facts onto the candidate
fn apply_snapshot(candidate: &mut Candidate, snapshot: &OnChainSnapshot) {
    if let Some(decimals) = snapshot.decimals {
        candidate.decimals = decimals;
    }
    if let Some(v) = snapshot.mint_authority_renounced {
        candidate.mint_authority_renounced = v;
    }
    if let Some(v) = snapshot.freeze_authority_renounced {
        candidate.freeze_authority_renounced = v;
    }
    if let Some(share) = snapshot.top10_holder_share {
        candidate.top10_holder_share = share.clamp(0.0, 1.0);
    }
    match snapshot.liquidity_usd {
        Some(liq) => candidate.liquidity_usd = liq.max(0.0),
        None => {
            if let Some(hint) = candidate.liquidity_hint() {
                candidate.liquidity_usd = candidate.liquidity_usd.max(hint);
            }
        }
    }
    if let Some(v) = snapshot.lp_locked {
        candidate.lp_locked = v;
    }
    if let Some(v) = snapshot.lp_burned {
        candidate.lp_burned = v;
    }
    if let Some(buyers) = snapshot.unique_buyers {
        candidate.unique_buyers_5m = candidate.unique_buyers_5m.max(buyers);
    }
    if let Some(ratio) = snapshot.buy_sell_ratio {
        candidate.buy_sell_ratio = ratio.max(0.0);
    }
}

/// Risk-increasing values used when enrichment fails
fn apply_risk_defaults(candidate: &mut Candidate) {
    candidate.mint_authority_renounced = false;
    candidate.freeze_authority_renounced = false;
    candidate.lp_locked = false;
    candidate.lp_burned = false;
    candidate.top10_holder_share = 1.0;
    candidate.liquidity_usd = candidate.liquidity_hint().unwrap_or(0.0);
}

fn apply_trade_stats(candidate: &mut Candidate, stats: &TradeStats) {
    candidate.buys_5m = candidate.buys_5m.max(stats.buys);
    candidate.sells_5m = candidate.sells_5m.max(stats.sells);
    candidate.unique_buyers_5m = candidate.unique_buyers_5m.max(stats.unique_buyer_count());
    if stats.sells > 0 {
        candidate.buy_sell_ratio = stats.buys as f64 / stats.sells as f64;
    }
}

/// Two or more sources reported within `window_secs` of each other
fn multi_source(sources: &HashMap<String, DateTime<Utc>>, window_secs: i64) -> bool {
    let mut times: Vec<DateTime<Utc>> = sources.values().copied().collect();
    times.sort();
    times
        .windows(2)
        .any(|pair| (pair[1] - pair[0]).num_seconds() <= window_secs)
}
