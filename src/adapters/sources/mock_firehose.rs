//! Synthetic firehose for load tests and offline runs.
//!
//! Emits `burst` candidates per tick at an average of `rate_per_sec`, with
//! a small random jitter per tick. A fixed seed makes runs reproducible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{SourceAdapter, SourceError};
use crate::application::queue::QueueProducer;
use crate::domain::{Candidate, Evidence, SOURCE_MOCK_FIREHOSE};

#[derive(Debug, Clone)]
pub struct MockFirehoseConfig {
    pub rate_per_sec: u32,
    pub burst: u32,
    pub jitter_ms: u64,
    /// Stop after this many events
    pub limit: Option<u64>,
    pub seed: Option<u64>,
}

impl Default for MockFirehoseConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 500,
            burst: 10,
            jitter_ms: 5,
            limit: None,
            seed: None,
        }
    }
}

impl MockFirehoseConfig {
    /// Time between bursts
    pub fn tick(&self) -> Duration {
        let rate = self.rate_per_sec.max(1) as f64;
        let burst = self.burst.max(1) as f64;
        Duration::from_secs_f64(burst / rate)
    }
}

pub struct MockFirehoseSource {
    config: MockFirehoseConfig,
    generated: AtomicU64,
    cancel: CancellationToken,
}

impl MockFirehoseSource {
    pub fn new(config: MockFirehoseConfig) -> Self {
        Self {
            config,
            generated: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Events produced so far
    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    fn limit_reached(&self) -> bool {
        self.config.limit.map_or(false, |limit| self.generated() >= limit)
    }
}

/// Candidate with random market and security attributes
pub fn synthetic_candidate(n: u64, rng: &mut impl Rng) -> Candidate {
    let mut c = Candidate::stub(format!("MockMint{:08}", n), SOURCE_MOCK_FIREHOSE, Evidence::Initialize, Utc::now());
    c.liquidity_usd = rng.gen_range(0.0..50_000.0);
    c.top10_holder_share = rng.gen_range(0.2..0.95);
    c.unique_buyers_5m = rng.gen_range(0..80);
    c.buys_5m = rng.gen_range(0..120);
    c.sells_5m = rng.gen_range(0..80);
    c.buy_sell_ratio = rng.gen_range(0.3..2.5);
    c.mint_authority_renounced = rng.gen_bool(0.6);
    c.freeze_authority_renounced = rng.gen_bool(0.7);
    c.lp_locked = rng.gen_bool(0.3);
    c.lp_burned = rng.gen_bool(0.3);
    let liq = c.liquidity_usd;
    c.with_extra("liq_hint", liq)
}

#[async_trait]
impl SourceAdapter for MockFirehoseSource {
    fn name(&self) -> &'static str {
        SOURCE_MOCK_FIREHOSE
    }

    async fn run(&self, queue: QueueProducer) -> Result<(), SourceError> {
        if self.config.rate_per_sec == 0 {
            return Err(SourceError::Config("mock_firehose rate_per_sec must be > 0".into()));
        }
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let tick = self.config.tick();
        info!(
            rate_per_sec = self.config.rate_per_sec,
            burst = self.config.burst,
            limit = ?self.config.limit,
            "Mock firehose starting"
        );

        while !self.cancel.is_cancelled() && !self.limit_reached() {
            for _ in 0..self.config.burst.max(1) {
                if self.limit_reached() {
                    break;
                }
                let n = self.generated.fetch_add(1, Ordering::Relaxed);
                queue.push_candidate(synthetic_candidate(n, &mut rng));
            }

            let jitter = if self.config.jitter_ms > 0 {
                Duration::from_millis(rng.gen_range(0..=self.config.jitter_ms))
            } else {
                Duration::ZERO
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(tick + jitter) => {}
            }
        }

        info!(generated = self.generated(), "Mock firehose stopped");
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue::candidate_queue;

    #[test]
    fn test_tick_from_rate_and_burst() {
        let cfg = MockFirehoseConfig::default();
        assert_eq!(cfg.tick(), Duration::from_millis(20));
    }

    #[test]
    fn test_seeded_candidates_are_reproducible() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let ca = synthetic_candidate(3, &mut a);
        let cb = synthetic_candidate(3, &mut b);
        assert_eq!(ca.mint, "MockMint00000003");
        assert_eq!(ca.liquidity_usd, cb.liquidity_usd);
        assert_eq!(ca.unique_buyers_5m, cb.unique_buyers_5m);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_limit() {
        let (producer, consumer) = candidate_queue(100);
        let source = MockFirehoseSource::new(MockFirehoseConfig {
            limit: Some(25),
            seed: Some(1),
            ..Default::default()
        });
        source.run(producer).await.unwrap();
        assert_eq!(source.generated(), 25);
        assert_eq!(consumer.len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_run() {
        let (producer, _consumer) = candidate_queue(10_000);
        let source = std::sync::Arc::new(MockFirehoseSource::new(MockFirehoseConfig {
            seed: Some(2),
            ..Default::default()
        }));
        let runner = {
            let source = source.clone();
            tokio::spawn(async move { source.run(producer).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        source.stop();
        runner.await.unwrap().unwrap();
        assert!(source.generated() > 0);
    }
}
