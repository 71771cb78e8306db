//! Pool-creation source
//!
//! Consumes a JSON feed of new liquidity pools. Field names vary between
//! providers so every attribute is read from a list of fallback keys.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedup::{SeenSet, DEFAULT_SEEN_TTL_SECS};
use super::stream::{run_stream, FrameHandler, StreamConfig};
use super::types::{epoch_to_datetime, first_bool, first_f64, first_str};
use super::{SourceAdapter, SourceError};
use crate::application::queue::QueueProducer;
use crate::domain::{is_known_non_token, synthetic_symbol, Candidate, Evidence, SOURCE_RAYDIUM_POOLS};

/// Decimals assumed for pool tokens when the event does not say
pub const POOL_DEFAULT_DECIMALS: u8 = 6;

#[derive(Debug, Clone)]
pub struct RaydiumPoolsConfig {
    pub stream: StreamConfig,
    /// Frame sent after connecting, if the feed needs one
    pub subscribe_message: Option<String>,
    pub seen_ttl: Duration,
}

impl RaydiumPoolsConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            stream: StreamConfig::new(ws_url),
            subscribe_message: None,
            seen_ttl: Duration::from_secs(DEFAULT_SEEN_TTL_SECS),
        }
    }
}

pub struct RaydiumPoolsSource {
    config: RaydiumPoolsConfig,
    cancel: CancellationToken,
}

impl RaydiumPoolsSource {
    pub fn new(config: RaydiumPoolsConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl SourceAdapter for RaydiumPoolsSource {
    fn name(&self) -> &'static str {
        SOURCE_RAYDIUM_POOLS
    }

    async fn run(&self, queue: QueueProducer) -> Result<(), SourceError> {
        if self.config.stream.url.trim().is_empty() {
            warn!("raydium_pools enabled without a ws url, source idle");
            return Ok(());
        }
        info!("Raydium pool source starting");
        let mut handler = PoolsHandler {
            subscribe: self.config.subscribe_message.clone(),
            seen: SeenSet::new(self.config.seen_ttl),
        };
        run_stream(SOURCE_RAYDIUM_POOLS, &self.config.stream, &mut handler, &queue, &self.cancel).await;
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

struct PoolsHandler {
    subscribe: Option<String>,
    seen: SeenSet,
}

#[async_trait]
impl FrameHandler for PoolsHandler {
    fn subscribe_messages(&self) -> Vec<String> {
        self.subscribe.iter().cloned().collect()
    }

    async fn on_frame(&mut self, frame: &str, queue: &QueueProducer) -> Result<Vec<String>, SourceError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| SourceError::Parse(e.to_string()))?;

        let events: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![value.get("data").filter(|d| d.is_object()).unwrap_or(&value)],
            _ => return Err(SourceError::InvalidMessageFormat("expected object or array".into())),
        };

        let now = Utc::now();
        for event in events {
            let Some(candidate) = parse_pool_event(event, now) else {
                debug!("Pool event without usable mint");
                continue;
            };
            if !self.seen.observe(&candidate.mint, candidate.evidence, Instant::now()) {
                continue;
            }
            debug!(mint = %candidate.mint, liquidity = candidate.liquidity_usd, "New pool");
            queue.push_candidate(candidate);
        }
        Ok(Vec::new())
    }
}

/// Build a candidate from one pool event.
///
/// Pool events name the token but do not prove its creation, so the
/// evidence is `Heuristic`. Holder share and authority flags are only set
/// when the event carries them.
pub fn parse_pool_event(event: &Value, now: DateTime<Utc>) -> Option<Candidate> {
    let mint = first_str(event, &["mint", "tokenMint", "baseMint"])?;
    if is_known_non_token(mint) {
        return None;
    }

    let first_seen = first_f64(event, &["createdAt", "timestamp", "openTime"])
        .and_then(epoch_to_datetime)
        .map_or(now, |ts| ts.min(now));

    let symbol = first_str(event, &["symbol", "baseSymbol", "tokenSymbol"])
        .map(String::from)
        .unwrap_or_else(|| synthetic_symbol(mint));
    let name = first_str(event, &["name", "baseName", "tokenName"])
        .map(String::from)
        .unwrap_or_else(|| symbol.clone());

    let mut c = Candidate::stub(mint, SOURCE_RAYDIUM_POOLS, Evidence::Heuristic, first_seen)
        .with_names(symbol, name);
    c.pool_address = first_str(event, &["pool", "poolId", "address"]).map(String::from);
    c.decimals = first_f64(event, &["decimals", "baseDecimals"])
        .filter(|d| (0.0..=u8::MAX as f64).contains(d))
        .map_or(POOL_DEFAULT_DECIMALS, |d| d as u8);

    if let Some(liq) = first_f64(event, &["liquidity", "liquidityUsd"]).filter(|l| *l >= 0.0) {
        c.liquidity_usd = liq;
        c = c.with_extra("liq_hint", liq);
    }
    c.lp_locked = first_bool(event, &["lpLocked"]).unwrap_or(false);
    c.lp_burned = first_bool(event, &["lpBurned"]).unwrap_or(false);
    if let Some(share) = first_f64(event, &["top10Share", "top10HolderShare"]) {
        c.top10_holder_share = share.clamp(0.0, 1.0);
    }
    if let Some(renounced) = first_bool(event, &["mintAuthorityRenounced"]) {
        c.mint_authority_renounced = renounced;
    }
    if let Some(renounced) = first_bool(event, &["freezeAuthorityRenounced"]) {
        c.freeze_authority_renounced = renounced;
    }
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue::{candidate_queue, QueueItem};
    use serde_json::json;

    #[test]
    fn test_parse_pool_event_with_fallback_keys() {
        let event = json!({
            "baseMint": "PoolMint1111",
            "poolId": "PoolAddr",
            "baseSymbol": "FROG",
            "liquidityUsd": 12500.0,
            "lpBurned": true
        });
        let c = parse_pool_event(&event, Utc::now()).unwrap();
        assert_eq!(c.mint, "PoolMint1111");
        assert_eq!(c.pool_address.as_deref(), Some("PoolAddr"));
        assert_eq!(c.symbol, "FROG");
        assert_eq!(c.name, "FROG");
        assert_eq!(c.decimals, POOL_DEFAULT_DECIMALS);
        assert_eq!(c.liquidity_usd, 12500.0);
        assert_eq!(c.liquidity_hint(), Some(12500.0));
        assert!(c.lp_burned);
        assert!(!c.lp_locked);
        assert_eq!(c.evidence, Evidence::Heuristic);
        assert_eq!(c.source, SOURCE_RAYDIUM_POOLS);
        // unknown holder share stays pessimistic
        assert_eq!(c.top10_holder_share, 1.0);
    }

    #[test]
    fn test_parse_pool_event_rejects_quote_and_missing_mint() {
        let now = Utc::now();
        assert!(parse_pool_event(&json!({"pool": "x"}), now).is_none());
        assert!(parse_pool_event(
            &json!({"mint": "So11111111111111111111111111111111111111112"}),
            now
        )
        .is_none());
    }

    #[test]
    fn test_parse_pool_event_symbol_fallback() {
        let c = parse_pool_event(&json!({"mint": "AbcdefghXYZ", "decimals": 9}), Utc::now()).unwrap();
        assert_eq!(c.symbol, "TOKEN_Abcdefgh");
        assert_eq!(c.decimals, 9);
    }

    #[tokio::test]
    async fn test_array_frame_pushes_each_new_pool() {
        let (producer, mut consumer) = candidate_queue(8);
        let mut handler = PoolsHandler {
            subscribe: None,
            seen: SeenSet::new(Duration::from_secs(60)),
        };
        let frame = r#"[{"mint":"MintA"},{"mint":"MintB"},{"mint":"MintA"}]"#;
        handler.on_frame(frame, &producer).await.unwrap();

        let mints: Vec<String> = consumer
            .drain(8)
            .into_iter()
            .map(|item| match item {
                QueueItem::Candidate(c) => c.mint,
                QueueItem::Trade(t) => t.mint,
            })
            .collect();
        assert_eq!(mints, vec!["MintA", "MintB"]);
    }

    #[tokio::test]
    async fn test_empty_url_returns_immediately() {
        let source = RaydiumPoolsSource::new(RaydiumPoolsConfig::new(""));
        let (producer, _consumer) = candidate_queue(1);
        assert!(source.run(producer).await.is_ok());
    }
}
