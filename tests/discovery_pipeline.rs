//! Discovery Pipeline Integration Tests
//!
//! Sources, queue and engine working together:
//! 1. Mock firehose burst into the bounded queue, drained over two cycles
//! 2. Ranked output honours the admission thresholds
//! 3. Scripted enrichment flows through to ranked candidates
//!
//! All tests are deterministic (seeded generator, no network calls).

use std::sync::Arc;
use std::time::Duration;

use butters_discovery::adapters::sources::{MockFirehoseConfig, MockFirehoseSource, SourceAdapter};
use butters_discovery::application::{candidate_queue, DiscoveryEngine, EngineConfig};
use butters_discovery::domain::admission::{self, AdmissionConfig};
use butters_discovery::domain::{Candidate, Evidence, TradeSide, TradeUpdate, SOURCE_PUMPPORTAL_WS};
use butters_discovery::ports::mocks::{ManualClock, MockTokenData};
use butters_discovery::ports::{OnChainSnapshot, SystemClock, TokenDataPort};
use chrono::Utc;

/// Wall-clock ceiling for one cycle over a 1000-item batch
const CYCLE_LATENCY_CEILING: Duration = Duration::from_secs(2);

// ============================================================================
// Test Fixtures
// ============================================================================

fn firehose(limit: u64, seed: u64) -> Arc<MockFirehoseSource> {
    Arc::new(MockFirehoseSource::new(MockFirehoseConfig {
        rate_per_sec: 500,
        limit: Some(limit),
        seed: Some(seed),
        ..Default::default()
    }))
}

fn assert_admissible(c: &Candidate, config: &AdmissionConfig) {
    let age = c.age_secs(Utc::now());
    assert!(
        c.overall_score >= config.score_floor() - 1e-9,
        "{} scored {} below floor {}",
        c.mint,
        c.overall_score,
        config.score_floor()
    );
    let bucket = config.bucket(age);
    assert!(c.liquidity_usd >= config.liquidity_floor(bucket));
    assert!(c.top10_holder_share <= config.concentration_ceiling(bucket));
    assert!(admission::evaluate(c, age, config).is_ok());
}

fn healthy_snapshot() -> OnChainSnapshot {
    OnChainSnapshot {
        decimals: Some(6),
        mint_authority_renounced: Some(true),
        freeze_authority_renounced: Some(true),
        top10_holder_share: Some(0.30),
        ..Default::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_two_cycles_stay_under_capacity() {
    let (producer, consumer) = candidate_queue(2000);
    let source = firehose(1000, 7);
    let task = {
        let source = source.clone();
        let producer = producer.clone();
        tokio::spawn(async move { source.run(producer).await })
    };

    let config = EngineConfig {
        batch_size: 1000,
        ..Default::default()
    };
    let mut engine = DiscoveryEngine::new(config, consumer, Arc::new(SystemClock)).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let mut peak = producer.stats().len;
    let started = std::time::Instant::now();
    let first = engine.run_analysis_cycle().await.unwrap();
    assert!(started.elapsed() < CYCLE_LATENCY_CEILING);

    task.await.unwrap().unwrap();
    peak = peak.max(producer.stats().len);
    let started = std::time::Instant::now();
    let second = engine.run_analysis_cycle().await.unwrap();
    assert!(started.elapsed() < CYCLE_LATENCY_CEILING);

    let stats = producer.stats();
    assert_eq!(source.generated(), 1000);
    assert_eq!(stats.dropped, 0);
    assert!(peak < stats.capacity);
    assert_eq!(first.tokens_scanned + second.tokens_scanned, 1000);
    assert_eq!(first.queue_dropped + second.queue_dropped, 0);
    assert_eq!(engine.stats().queue_len, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ranked_output_honours_admission() {
    let (producer, consumer) = candidate_queue(2000);
    firehose(600, 42).run(producer).await.unwrap();

    let config = EngineConfig {
        batch_size: 1000,
        max_candidates: 200,
        ..Default::default()
    };
    let admission_config = config.admission.clone();
    let mut engine = DiscoveryEngine::new(config, consumer, Arc::new(SystemClock)).unwrap();
    let summary = engine.run_analysis_cycle().await.unwrap();
    assert_eq!(summary.tokens_scanned, 600);

    let ranked = engine.best_candidates(50, Some(0.0));
    assert!(!ranked.is_empty(), "seeded burst should admit something");
    for pair in ranked.windows(2) {
        assert!(pair[0].overall_score >= pair[1].overall_score);
    }
    for c in &ranked {
        assert_admissible(c, &admission_config);
    }

    // default threshold can only be stricter
    let strict = engine.best_candidates(50, None);
    assert!(strict.len() <= ranked.len());
    for c in &strict {
        assert_admissible(c, &admission_config);
    }
}

#[tokio::test]
async fn test_enriched_stream_candidate_reaches_ranking() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (producer, consumer) = candidate_queue(100);
    let port: Arc<dyn TokenDataPort> = Arc::new(MockTokenData::new().with_default(healthy_snapshot()));
    let mut engine = DiscoveryEngine::new(EngineConfig::default(), consumer, clock.clone())
        .unwrap()
        .with_token_data(port);

    let mint = "FreshMint1111111111111111111111111111111111";
    let candidate = Candidate::stub(mint, SOURCE_PUMPPORTAL_WS, Evidence::Initialize, Utc::now())
        .with_extra("liq_hint", 8_000.0);
    producer.push_candidate(candidate);
    for i in 0..6 {
        producer.push_trade(TradeUpdate {
            mint: mint.to_string(),
            trader: Some(format!("Buyer{}", i)),
            side: Some(TradeSide::Buy),
            ts: Utc::now(),
        });
    }

    engine.run_analysis_cycle().await.unwrap();
    let c = engine.get(mint).expect("candidate tracked");
    assert!(c.mint_authority_renounced);
    assert_eq!(c.unique_buyers_5m, 6);

    // past the TTL it leaves the ranked set
    clock.advance(Duration::from_secs(601));
    engine.run_analysis_cycle().await.unwrap();
    assert!(engine.get(mint).is_none());
    assert!(engine.best_candidates(10, Some(0.0)).is_empty());
}
