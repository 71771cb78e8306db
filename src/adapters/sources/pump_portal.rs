//! PumpPortal WebSocket source
//!
//! Real-time pump.fun token launches and trades from
//! wss://pumpportal.fun/api/data.
//!
//! Each new-token event becomes an `Initialize` candidate and opens a
//! `subscribeTokenTrade` stream for that mint; trade events are forwarded as
//! [`TradeUpdate`]s for the engine's activity counters.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedup::{SeenSet, DEFAULT_SEEN_TTL_SECS};
use super::stream::{run_stream, FrameHandler, StreamConfig};
use super::types::{PumpFrame, PumpFrameKind, SubscribeMessage};
use super::{label_candidate, SourceAdapter, SourceError, DEFAULT_METADATA_TIMEOUT_MS};
use crate::application::queue::QueueProducer;
use crate::domain::{Candidate, Evidence, TradeUpdate, SOURCE_PUMPPORTAL_WS};
use crate::ports::MetadataPort;

/// Default WebSocket URL for PumpPortal data
pub const DEFAULT_WS_URL: &str = "wss://pumpportal.fun/api/data";

/// Mints with an open trade subscription at any time
pub const DEFAULT_MAX_TRADE_SUBSCRIPTIONS: usize = 500;

#[derive(Debug, Clone)]
pub struct PumpPortalConfig {
    pub stream: StreamConfig,
    /// Follow trades of every new mint
    pub track_trades: bool,
    pub max_trade_subscriptions: usize,
    pub seen_ttl: Duration,
    pub metadata_timeout: Duration,
}

impl Default for PumpPortalConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::new(DEFAULT_WS_URL),
            track_trades: true,
            max_trade_subscriptions: DEFAULT_MAX_TRADE_SUBSCRIPTIONS,
            seen_ttl: Duration::from_secs(DEFAULT_SEEN_TTL_SECS),
            metadata_timeout: Duration::from_millis(DEFAULT_METADATA_TIMEOUT_MS),
        }
    }
}

pub struct PumpPortalSource {
    config: PumpPortalConfig,
    metadata: Option<Arc<dyn MetadataPort>>,
    cancel: CancellationToken,
}

impl PumpPortalSource {
    pub fn new(config: PumpPortalConfig, metadata: Option<Arc<dyn MetadataPort>>) -> Self {
        Self {
            config,
            metadata,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl SourceAdapter for PumpPortalSource {
    fn name(&self) -> &'static str {
        SOURCE_PUMPPORTAL_WS
    }

    async fn run(&self, queue: QueueProducer) -> Result<(), SourceError> {
        info!(track_trades = self.config.track_trades, "PumpPortal source starting");
        let mut handler = PumpHandler::new(&self.config, self.metadata.clone());
        run_stream(SOURCE_PUMPPORTAL_WS, &self.config.stream, &mut handler, &queue, &self.cancel).await;
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

struct PumpHandler {
    seen: SeenSet,
    track_trades: bool,
    max_trade_subscriptions: usize,
    /// Mints with a trade subscription, oldest first
    subscribed: VecDeque<String>,
    subscribed_set: HashSet<String>,
    metadata: Option<Arc<dyn MetadataPort>>,
    metadata_timeout: Duration,
}

impl PumpHandler {
    fn new(config: &PumpPortalConfig, metadata: Option<Arc<dyn MetadataPort>>) -> Self {
        Self {
            seen: SeenSet::new(config.seen_ttl),
            track_trades: config.track_trades,
            max_trade_subscriptions: config.max_trade_subscriptions.max(1),
            subscribed: VecDeque::new(),
            subscribed_set: HashSet::new(),
            metadata,
            metadata_timeout: config.metadata_timeout,
        }
    }

    /// Open a trade stream for `mint`, closing the oldest one when at the cap
    fn track(&mut self, mint: &str) -> Vec<String> {
        if !self.track_trades || self.subscribed_set.contains(mint) {
            return Vec::new();
        }
        let mut replies = Vec::new();
        if self.subscribed.len() >= self.max_trade_subscriptions {
            if let Some(oldest) = self.subscribed.pop_front() {
                self.subscribed_set.remove(&oldest);
                replies.push(SubscribeMessage::unsubscribe_token_trades(vec![oldest]).to_json());
            }
        }
        self.subscribed.push_back(mint.to_string());
        self.subscribed_set.insert(mint.to_string());
        replies.push(SubscribeMessage::token_trades(vec![mint.to_string()]).to_json());
        replies
    }

    async fn on_new_token(&mut self, frame: PumpFrame, queue: &QueueProducer) -> Vec<String> {
        let Some(mint) = frame.mint.clone() else {
            return Vec::new();
        };
        if !self.seen.observe(&mint, Evidence::Initialize, Instant::now()) {
            return Vec::new();
        }

        let now = Utc::now();
        let first_seen = frame.timestamp_or(now).min(now);
        let mut candidate = Candidate::stub(mint.clone(), SOURCE_PUMPPORTAL_WS, Evidence::Initialize, first_seen)
            .with_extra("first_trade_ts", first_seen.timestamp_millis() as f64 / 1000.0);
        candidate.pool_address = frame.pool.clone();
        if let Some(sig) = frame.signature.clone() {
            candidate = candidate.with_extra("signature", sig);
        }
        if let Some(mc) = frame.market_cap_sol {
            candidate = candidate.with_extra("market_cap_sol", mc);
        }

        candidate = match frame.symbol.clone() {
            Some(symbol) => {
                let name = frame.name.clone().unwrap_or_else(|| symbol.clone());
                candidate.with_names(symbol, name)
            }
            None => label_candidate(candidate, self.metadata.as_ref(), self.metadata_timeout).await,
        };

        debug!(mint = %mint, symbol = %candidate.symbol, "PumpPortal new token");
        queue.push_candidate(candidate);
        self.track(&mint)
    }

    fn on_trade(&mut self, frame: PumpFrame, kind: PumpFrameKind, queue: &QueueProducer) {
        let (Some(mint), PumpFrameKind::Trade(side)) = (frame.mint.clone(), kind) else {
            return;
        };
        let update = TradeUpdate {
            mint,
            trader: frame.trader.clone(),
            side: Some(side),
            ts: frame.timestamp_or(Utc::now()),
        };
        queue.push_trade(update);
    }
}

#[async_trait]
impl FrameHandler for PumpHandler {
    fn subscribe_messages(&self) -> Vec<String> {
        let mut msgs = vec![SubscribeMessage::new_tokens().to_json()];
        // restore trade streams after a reconnect
        if self.track_trades && !self.subscribed.is_empty() {
            msgs.push(SubscribeMessage::token_trades(self.subscribed.iter().cloned().collect()).to_json());
        }
        msgs
    }

    async fn on_frame(&mut self, frame: &str, queue: &QueueProducer) -> Result<Vec<String>, SourceError> {
        let parsed = PumpFrame::parse(frame).map_err(|e| {
            SourceError::Parse(format!(
                "JSON parse error at line {}, column {}: {:?}",
                e.line(),
                e.column(),
                e.classify()
            ))
        })?;

        let kind = parsed.kind();
        match kind {
            PumpFrameKind::NewToken => Ok(self.on_new_token(parsed, queue).await),
            PumpFrameKind::Trade(_) => {
                self.on_trade(parsed, kind, queue);
                Ok(Vec::new())
            }
            PumpFrameKind::Confirmation => {
                debug!(message = ?parsed.message, "Subscription confirmed");
                Ok(Vec::new())
            }
            PumpFrameKind::Error => {
                warn!(errors = ?parsed.errors, "PumpPortal server error");
                Ok(Vec::new())
            }
            PumpFrameKind::Unknown => Err(SourceError::InvalidMessageFormat(
                "frame has no mint or recognised type".into(),
            )),
        }
    }
}
