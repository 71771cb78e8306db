//! Helius log-stream source
//!
//! Subscribes to `logsSubscribe` for each configured program and turns
//! mint-creation transactions into candidate stubs.
//!
//! Parsed `initializeMint`/`initializeMint2` instructions give `Initialize`
//! evidence. Without them the mint is guessed from `postTokenBalances` and
//! then from address-shaped words in the log lines. The guess is best-effort
//! and can pick up an unrelated account in unusual transactions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::dedup::{SeenSet, DEFAULT_SEEN_TTL_SECS};
use super::stream::{run_stream, FrameHandler, StreamConfig};
use super::{label_candidate, SourceAdapter, SourceError, DEFAULT_METADATA_TIMEOUT_MS};
use crate::application::queue::QueueProducer;
use crate::domain::known_programs::{is_plausible_mint, PUMP_FUN_PROGRAM, TOKEN_PROGRAM};
use crate::domain::{Candidate, Evidence, SOURCE_HELIUS_LOGS};
use crate::ports::MetadataPort;

/// Log fragments that mark a mint-creating transaction
const CREATION_MARKERS: &[&str] = &["InitializeMint", "Instruction: Create"];

#[derive(Debug, Clone)]
pub struct HeliusLogsConfig {
    pub stream: StreamConfig,
    /// Programs passed as `mentions` filters
    pub programs: Vec<String>,
    pub seen_ttl: Duration,
    pub metadata_timeout: Duration,
}

impl HeliusLogsConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            stream: StreamConfig::new(ws_url),
            programs: vec![TOKEN_PROGRAM.to_string(), PUMP_FUN_PROGRAM.to_string()],
            seen_ttl: Duration::from_secs(DEFAULT_SEEN_TTL_SECS),
            metadata_timeout: Duration::from_millis(DEFAULT_METADATA_TIMEOUT_MS),
        }
    }
}

/// A mint found in one notification
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub mint: String,
    pub evidence: Evidence,
    pub signature: Option<String>,
    pub program_id: Option<String>,
}

pub struct HeliusLogsSource {
    config: HeliusLogsConfig,
    metadata: Option<Arc<dyn MetadataPort>>,
    cancel: CancellationToken,
}

impl HeliusLogsSource {
    pub fn new(config: HeliusLogsConfig, metadata: Option<Arc<dyn MetadataPort>>) -> Self {
        Self {
            config,
            metadata,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl SourceAdapter for HeliusLogsSource {
    fn name(&self) -> &'static str {
        SOURCE_HELIUS_LOGS
    }

    async fn run(&self, queue: QueueProducer) -> Result<(), SourceError> {
        if self.config.programs.is_empty() {
            return Err(SourceError::Config("helius_logs needs at least one program id".into()));
        }
        info!(programs = self.config.programs.len(), "Helius log source starting");

        let mut handler = LogsHandler {
            programs: self.config.programs.clone(),
            seen: SeenSet::new(self.config.seen_ttl),
            metadata: self.metadata.clone(),
            metadata_timeout: self.config.metadata_timeout,
        };
        run_stream(SOURCE_HELIUS_LOGS, &self.config.stream, &mut handler, &queue, &self.cancel).await;
        Ok(())
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

struct LogsHandler {
    programs: Vec<String>,
    seen: SeenSet,
    metadata: Option<Arc<dyn MetadataPort>>,
    metadata_timeout: Duration,
}

#[async_trait]
impl FrameHandler for LogsHandler {
    fn subscribe_messages(&self) -> Vec<String> {
        subscribe_messages(&self.programs)
    }

    async fn on_frame(&mut self, frame: &str, queue: &QueueProducer) -> Result<Vec<String>, SourceError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| SourceError::Parse(e.to_string()))?;

        if value.get("params").is_none() {
            if let Some(id) = value.get("result") {
                debug!(subscription = %id, "Log subscription confirmed");
            }
            return Ok(Vec::new());
        }

        for detection in parse_notification(&value) {
            if !self.seen.observe(&detection.mint, detection.evidence, Instant::now()) {
                continue;
            }
            let now = Utc::now();
            let mut candidate =
                Candidate::stub(detection.mint.clone(), SOURCE_HELIUS_LOGS, detection.evidence, now)
                    .with_extra("first_trade_ts", now.timestamp_millis() as f64 / 1000.0);
            if let Some(sig) = detection.signature {
                candidate = candidate.with_extra("signature", sig);
            }
            if let Some(program) = detection.program_id {
                candidate = candidate.with_extra("program_id", program);
            }
            let candidate =
                label_candidate(candidate, self.metadata.as_ref(), self.metadata_timeout).await;

            debug!(mint = %candidate.mint, evidence = ?candidate.evidence, "Helius candidate");
            queue.push_candidate(candidate);
        }
        Ok(Vec::new())
    }
}

/// One `logsSubscribe` request per program
pub fn subscribe_messages(programs: &[String]) -> Vec<String> {
    programs
        .iter()
        .enumerate()
        .map(|(i, program)| {
            json!({
                "jsonrpc": "2.0",
                "id": i + 1,
                "method": "logsSubscribe",
                "params": [
                    {"mentions": [program]},
                    {"commitment": "confirmed"}
                ]
            })
            .to_string()
        })
        .collect()
}

/// Extract new-mint detections from a log notification
pub fn parse_notification(value: &Value) -> Vec<Detection> {
    let Some(v) = value.pointer("/params/result/value") else {
        return Vec::new();
    };
    // failed transactions create nothing
    if v.get("err").map_or(false, |e| !e.is_null()) {
        return Vec::new();
    }

    let signature = v.get("signature").and_then(Value::as_str).map(String::from);
    let logs: Vec<&str> = v
        .get("logs")
        .and_then(Value::as_array)
        .map(|l| l.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let program_id = first_invoked_program(&logs);

    let mut initialized = Vec::new();
    collect_initialized_mints(v, &mut initialized);
    let initialized = plausible_unique(initialized);
    if !initialized.is_empty() {
        return to_detections(initialized, Evidence::Initialize, &signature, &program_id);
    }

    if !logs.iter().any(|line| CREATION_MARKERS.iter().any(|m| line.contains(m))) {
        return Vec::new();
    }

    let mut guessed = Vec::new();
    collect_post_balance_mints(v, &mut guessed);
    let mut guessed = plausible_unique(guessed);
    if guessed.is_empty() {
        guessed = plausible_unique(scan_log_words(&logs));
    }
    to_detections(guessed, Evidence::Heuristic, &signature, &program_id)
}

fn to_detections(
    mints: Vec<String>,
    evidence: Evidence,
    signature: &Option<String>,
    program_id: &Option<String>,
) -> Vec<Detection> {
    mints
        .into_iter()
        .map(|mint| Detection {
            mint,
            evidence,
            signature: signature.clone(),
            program_id: program_id.clone(),
        })
        .collect()
}

fn plausible_unique(mints: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    mints
        .into_iter()
        .filter(|m| is_plausible_mint(m))
        .filter(|m| seen.insert(m.clone()))
        .collect()
}

/// Walk the payload for parsed initializeMint/initializeMint2 instructions
fn collect_initialized_mints(node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(parsed) = map.get("parsed") {
                let kind = parsed.get("type").and_then(Value::as_str);
                if matches!(kind, Some("initializeMint") | Some("initializeMint2")) {
                    if let Some(mint) = parsed.pointer("/info/mint").and_then(Value::as_str) {
                        out.push(mint.to_string());
                    }
                }
            }
            for child in map.values() {
                collect_initialized_mints(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_initialized_mints(item, out);
            }
        }
        _ => {}
    }
}

fn collect_post_balance_mints(node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::Array(balances)) = map.get("postTokenBalances") {
                out.extend(
                    balances
                        .iter()
                        .filter_map(|b| b.get("mint").and_then(Value::as_str))
                        .map(String::from),
                );
            }
            for (key, child) in map {
                if key != "postTokenBalances" {
                    collect_post_balance_mints(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_post_balance_mints(item, out);
            }
        }
        _ => {}
    }
}

/// Address-shaped words in log lines. The word after "Program" is the
/// invoked program id and is skipped.
fn scan_log_words(logs: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for line in logs {
        let mut after_program = false;
        let words = line
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty());
        for word in words {
            if after_program {
                after_program = false;
                continue;
            }
            if word == "Program" {
                after_program = true;
                continue;
            }
            if is_plausible_mint(word) {
                out.push(word.to_string());
            }
        }
    }
    out
}

fn first_invoked_program(logs: &[&str]) -> Option<String> {
    logs.iter().find_map(|line| {
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("Program"), Some(id), Some("invoke")) => Some(id.to_string()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn notification(value: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {"result": {"context": {"slot": 1}, "value": value}, "subscription": 7}
        })
    }

    #[test]
    fn test_subscribe_message_shape() {
        let msgs = subscribe_messages(&[TOKEN_PROGRAM.to_string()]);
        assert_eq!(msgs.len(), 1);
        let v: Value = serde_json::from_str(&msgs[0]).unwrap();
        assert_eq!(v["method"], "logsSubscribe");
        assert_eq!(v["params"][0]["mentions"][0], TOKEN_PROGRAM);
        assert_eq!(v["params"][1]["commitment"], "confirmed");
    }

    #[test]
    fn test_parsed_initialize_gives_strong_evidence() {
        let v = notification(json!({
            "signature": "sig1",
            "err": null,
            "logs": ["Program TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA invoke [1]"],
            "transaction": {"message": {"instructions": [
                {"program": "spl-token", "parsed": {"type": "initializeMint2", "info": {"mint": NEW_MINT, "decimals": 6}}}
            ]}}
        }));
        let found = parse_notification(&v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mint, NEW_MINT);
        assert_eq!(found[0].evidence, Evidence::Initialize);
        assert_eq!(found[0].signature.as_deref(), Some("sig1"));
        assert_eq!(found[0].program_id.as_deref(), Some(TOKEN_PROGRAM));
    }

    #[test]
    fn test_post_balances_fallback_is_heuristic() {
        let v = notification(json!({
            "signature": "sig2",
            "err": null,
            "logs": ["Program log: Instruction: InitializeMint2"],
            "meta": {"postTokenBalances": [
                {"mint": "So11111111111111111111111111111111111111112"},
                {"mint": NEW_MINT}
            ]}
        }));
        let found = parse_notification(&v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mint, NEW_MINT);
        assert_eq!(found[0].evidence, Evidence::Heuristic);
    }

    #[test]
    fn test_log_word_fallback_skips_program_ids() {
        let v = notification(json!({
            "signature": "sig3",
            "err": null,
            "logs": [
                "Program 6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P invoke [1]",
                "Program log: Instruction: Create",
                format!("Program log: mint={}", NEW_MINT),
                "Program 6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P success"
            ]
        }));
        let found = parse_notification(&v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mint, NEW_MINT);
        assert_eq!(found[0].evidence, Evidence::Heuristic);
    }

    #[test]
    fn test_non_creation_logs_are_ignored() {
        let v = notification(json!({
            "signature": "sig4",
            "err": null,
            "logs": ["Program log: Instruction: Transfer", format!("Program log: {}", NEW_MINT)]
        }));
        assert!(parse_notification(&v).is_empty());
    }

    #[test]
    fn test_failed_transaction_ignored() {
        let v = notification(json!({
            "signature": "sig5",
            "err": {"InstructionError": [0, "Custom"]},
            "logs": ["Program log: Instruction: InitializeMint"],
            "meta": {"postTokenBalances": [{"mint": NEW_MINT}]}
        }));
        assert!(parse_notification(&v).is_empty());
    }

    #[test]
    fn test_malformed_ids_rejected() {
        let v = notification(json!({
            "signature": "sig6",
            "err": null,
            "logs": ["Program log: Instruction: InitializeMint"],
            "meta": {"postTokenBalances": [{"mint": "not-a-key"}, {"mint": TOKEN_PROGRAM}]}
        }));
        assert!(parse_notification(&v).is_empty());
    }

    #[tokio::test]
    async fn test_handler_dedups_and_enqueues() {
        let (producer, mut consumer) = crate::application::queue::candidate_queue(16);
        let mut handler = LogsHandler {
            programs: vec![TOKEN_PROGRAM.to_string()],
            seen: SeenSet::new(Duration::from_secs(60)),
            metadata: None,
            metadata_timeout: Duration::from_millis(10),
        };
        let frame = notification(json!({
            "signature": "sig7",
            "err": null,
            "logs": ["Program log: Instruction: InitializeMint2"],
            "meta": {"postTokenBalances": [{"mint": NEW_MINT}]}
        }))
        .to_string();

        handler.on_frame(&frame, &producer).await.unwrap();
        handler.on_frame(&frame, &producer).await.unwrap();

        let items = consumer.drain(10);
        assert_eq!(items.len(), 1);
        match &items[0] {
            crate::application::queue::QueueItem::Candidate(c) => {
                assert_eq!(c.symbol, "TOKEN_DezXAZ8z");
                assert_eq!(c.extra["signature"], "sig7");
            }
            other => panic!("unexpected item {:?}", other),
        }
    }
}
