//! Configuration Loader
//!
//! Loads, overrides from the environment and validates the TOML config.
//! Every field has a default, so an empty file is a valid config.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::adapters::rpc_pool::{RpcPool, RpcPoolError, DEFAULT_ERROR_THRESHOLD, DEFAULT_PENALTY_SECS};
use crate::adapters::sources::{
    pump_portal, HeliusLogsConfig, HeliusLogsSource, MockFirehoseConfig, MockFirehoseSource,
    PumpPortalConfig, PumpPortalSource, RaydiumPoolsConfig, RaydiumPoolsSource, Source,
    DEFAULT_METADATA_TIMEOUT_MS,
};
use crate::adapters::token_data::TokenDataConfig;
use crate::application::engine::EngineConfig;
use crate::application::queue::DEFAULT_MAX_QUEUE;
use crate::application::scheduler::SchedulerConfig;
use crate::domain::admission::AdmissionConfig;
use crate::domain::known_programs::{PUMP_FUN_PROGRAM, TOKEN_PROGRAM};
use crate::domain::scoring::ScoringConfig;
use crate::domain::{SOURCE_HELIUS_LOGS, SOURCE_PUMPPORTAL_WS};
use crate::ports::MetadataPort;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoverySection,
    pub rpc: RpcSection,
    pub scheduler: SchedulerSection,
    pub logging: LoggingSection,
}

/// Admission, scoring and engine knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub min_liq_usd: f64,
    /// Liquidity floor inside the freshness window
    pub min_liq_fresh_usd: f64,
    pub score_threshold: f64,
    pub min_score_cap_delta: f64,
    pub max_top10_share: f64,
    pub max_top10_share_fresh: f64,
    pub fresh_window_sec: u64,
    pub candidate_ttl_sec: u64,
    pub max_queue: usize,
    pub batch_size: usize,
    pub enrich_concurrency: usize,
    pub enrich_timeout_ms: u64,
    /// Ranked set capacity
    pub max_candidates: usize,
    pub multi_source_bonus: f64,
    pub multi_source_window_sec: i64,
    /// Programs the log stream subscribes to
    pub program_ids: Vec<String>,
    pub sources: SourcesSection,
    pub fresh_pass: FreshPassSection,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let admission = AdmissionConfig::default();
        let scoring = ScoringConfig::default();
        Self {
            min_liq_usd: admission.min_liq_usd,
            min_liq_fresh_usd: admission.min_liq_fresh_usd,
            score_threshold: admission.score_threshold,
            min_score_cap_delta: admission.min_score_cap_delta,
            max_top10_share: admission.max_top10_share,
            max_top10_share_fresh: admission.max_top10_share_fresh,
            fresh_window_sec: admission.fresh_window_secs as u64,
            candidate_ttl_sec: admission.candidate_ttl_secs as u64,
            max_queue: DEFAULT_MAX_QUEUE,
            batch_size: crate::application::engine::DEFAULT_BATCH_SIZE,
            enrich_concurrency: crate::application::engine::DEFAULT_ENRICH_CONCURRENCY,
            enrich_timeout_ms: crate::application::engine::DEFAULT_ENRICH_TIMEOUT_MS,
            max_candidates: crate::application::engine::DEFAULT_MAX_CANDIDATES,
            multi_source_bonus: scoring.multi_source_bonus,
            multi_source_window_sec: scoring.multi_source_window_secs,
            program_ids: vec![TOKEN_PROGRAM.to_string(), PUMP_FUN_PROGRAM.to_string()],
            sources: SourcesSection::default(),
            fresh_pass: FreshPassSection::default(),
        }
    }
}

/// Enabled sources and their endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesSection {
    pub helius_logs: bool,
    pub pumpportal_ws: bool,
    pub raydium_pools: bool,
    pub mock_firehose: bool,
    pub helius_ws_url: String,
    pub pumpportal_ws_url: String,
    pub raydium_ws_url: String,
    /// Raw subscribe frame sent to the pool feed, if it needs one
    pub raydium_subscribe: Option<String>,
    pub track_trades: bool,
    pub max_trade_subscriptions: usize,
    pub reconnect_delay_sec: u64,
    pub mock_rate_per_sec: u32,
    pub mock_limit: Option<u64>,
    pub mock_seed: Option<u64>,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            helius_logs: true,
            pumpportal_ws: true,
            raydium_pools: false,
            mock_firehose: false,
            helius_ws_url: String::new(),
            pumpportal_ws_url: pump_portal::DEFAULT_WS_URL.to_string(),
            raydium_ws_url: String::new(),
            raydium_subscribe: None,
            track_trades: true,
            max_trade_subscriptions: pump_portal::DEFAULT_MAX_TRADE_SUBSCRIPTIONS,
            reconnect_delay_sec: crate::adapters::sources::stream::DEFAULT_RECONNECT_DELAY_SECS,
            mock_rate_per_sec: 500,
            mock_limit: None,
            mock_seed: None,
        }
    }
}

impl SourcesSection {
    fn any_enabled(&self) -> bool {
        self.helius_logs || self.pumpportal_ws || self.raydium_pools || self.mock_firehose
    }

    fn only_mock(&self) -> bool {
        self.mock_firehose && !(self.helius_logs || self.pumpportal_ws || self.raydium_pools)
    }
}

/// Relaxed admission for very young candidates
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FreshPassSection {
    pub enabled: bool,
    pub sources: Vec<String>,
    pub min_unique_buyers: u32,
    pub min_trades: u32,
    pub mature_min_unique_buyers: u32,
}

impl Default for FreshPassSection {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: vec![SOURCE_PUMPPORTAL_WS.to_string(), SOURCE_HELIUS_LOGS.to_string()],
            min_unique_buyers: 3,
            min_trades: 5,
            mature_min_unique_buyers: 5,
        }
    }
}

/// RPC endpoint pool
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    pub urls: Vec<String>,
    /// Consecutive failures before quarantine
    pub error_threshold: u32,
    pub penalty_sec: u64,
    pub request_timeout_sec: u64,
    pub metadata_timeout_ms: u64,
    pub commitment: String,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            penalty_sec: DEFAULT_PENALTY_SECS,
            request_timeout_sec: 10,
            metadata_timeout_ms: DEFAULT_METADATA_TIMEOUT_MS,
            commitment: "confirmed".to_string(),
        }
    }
}

/// Cycle cadence and lifecycle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub interval_sec: u64,
    pub align_start: bool,
    pub startup_watchdog_sec: u64,
    pub manual_trigger_poll_sec: u64,
    pub heartbeat_sec: u64,
    pub shutdown_timeout_sec: u64,
    pub max_cycles: Option<u64>,
    pub max_runtime_sec: Option<u64>,
    pub runtime_dir: String,
    pub kill_switch_path: Option<String>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval_sec: 60,
            align_start: true,
            startup_watchdog_sec: 5,
            manual_trigger_poll_sec: 1,
            heartbeat_sec: 10,
            shutdown_timeout_sec: 12,
            max_cycles: None,
            max_runtime_sec: None,
            runtime_dir: ".runtime".to_string(),
            kill_switch_path: None,
        }
    }
}

impl SchedulerSection {
    pub fn runtime_dir(&self) -> PathBuf {
        PathBuf::from(&self.runtime_dir)
    }

    pub fn trigger_path(&self) -> PathBuf {
        self.runtime_dir().join("trigger_cycle")
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// JSON lines instead of the human formatter
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file, apply env overrides, validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Config {
    /// Override from process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Override from any lookup; unset variables leave the config untouched
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = &mut self.discovery;
        if let Some(v) = lookup("DISCOVERY_SCORE_THRESHOLD") {
            d.score_threshold = parse_env("DISCOVERY_SCORE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_MIN_LIQ_USD") {
            d.min_liq_usd = parse_env("DISCOVERY_MIN_LIQ_USD", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_MIN_LIQ_FRESH_USD") {
            d.min_liq_fresh_usd = parse_env("DISCOVERY_MIN_LIQ_FRESH_USD", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_MIN_SCORE_CAP_DELTA") {
            d.min_score_cap_delta = parse_env("DISCOVERY_MIN_SCORE_CAP_DELTA", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_MAX_TOP10_SHARE") {
            d.max_top10_share = parse_env("DISCOVERY_MAX_TOP10_SHARE", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_MAX_TOP10_SHARE_FRESH") {
            d.max_top10_share_fresh = parse_env("DISCOVERY_MAX_TOP10_SHARE_FRESH", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_CANDIDATE_TTL_SEC") {
            d.candidate_ttl_sec = parse_env("DISCOVERY_CANDIDATE_TTL_SEC", &v)?;
        }
        if let Some(v) = lookup("HELIUS_WS_URL") {
            if !v.trim().is_empty() {
                d.sources.helius_ws_url = v.trim().to_string();
            }
        }

        if let Some(v) = lookup("SOLANA_RPC_URLS") {
            let urls: Vec<String> = v
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
            if !urls.is_empty() {
                self.rpc.urls = urls;
            }
        }

        let s = &mut self.scheduler;
        if let Some(v) = lookup("TEST_MAX_CYCLES") {
            s.max_cycles = Some(parse_env("TEST_MAX_CYCLES", &v)?);
        }
        if let Some(v) = lookup("TEST_MAX_RUNTIME") {
            s.max_runtime_sec = Some(parse_env("TEST_MAX_RUNTIME", &v)?);
        }
        if let Some(v) = lookup("TEST_ALIGN_NOW") {
            if parse_flag("TEST_ALIGN_NOW", &v)? {
                s.align_start = false;
            }
        }
        Ok(())
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.discovery;

        for (name, value) in [
            ("score_threshold", d.score_threshold),
            ("min_score_cap_delta", d.min_score_cap_delta),
            ("max_top10_share", d.max_top10_share),
            ("max_top10_share_fresh", d.max_top10_share_fresh),
            ("multi_source_bonus", d.multi_source_bonus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be 0-1, got {}",
                    name, value
                )));
            }
        }

        if d.min_liq_usd < 0.0 || d.min_liq_fresh_usd < 0.0 {
            return Err(ConfigError::ValidationError(
                "liquidity floors cannot be negative".to_string(),
            ));
        }

        if d.candidate_ttl_sec == 0 {
            return Err(ConfigError::ValidationError(
                "candidate_ttl_sec must be > 0".to_string(),
            ));
        }

        if d.max_queue == 0 || d.batch_size == 0 || d.max_candidates == 0 {
            return Err(ConfigError::ValidationError(
                "max_queue, batch_size and max_candidates must be > 0".to_string(),
            ));
        }

        if d.enrich_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "enrich_concurrency must be > 0".to_string(),
            ));
        }

        if !d.sources.any_enabled() {
            return Err(ConfigError::ValidationError(
                "at least one source must be enabled".to_string(),
            ));
        }

        if d.sources.helius_logs && d.sources.helius_ws_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "helius_logs is enabled but helius_ws_url is empty (set HELIUS_WS_URL)".to_string(),
            ));
        }

        if d.sources.helius_logs && d.program_ids.is_empty() {
            return Err(ConfigError::ValidationError(
                "program_ids cannot be empty when helius_logs is enabled".to_string(),
            ));
        }

        if d.sources.mock_firehose && d.sources.mock_rate_per_sec == 0 {
            return Err(ConfigError::ValidationError(
                "mock_rate_per_sec must be > 0".to_string(),
            ));
        }

        if self.rpc.urls.is_empty() && !d.sources.only_mock() {
            return Err(ConfigError::ValidationError(
                "rpc.urls cannot be empty (set SOLANA_RPC_URLS)".to_string(),
            ));
        }

        if self.scheduler.interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "interval_sec must be > 0".to_string(),
            ));
        }

        if self.scheduler.shutdown_timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "shutdown_timeout_sec must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// RPC pool over the configured endpoints; `None` when there are none
    pub fn build_rpc_pool(&self) -> Result<Option<RpcPool>, RpcPoolError> {
        if self.rpc.urls.is_empty() {
            return Ok(None);
        }
        RpcPool::new(
            self.rpc.urls.clone(),
            self.rpc.error_threshold,
            Duration::from_secs(self.rpc.penalty_sec),
        )
        .map(Some)
    }

    /// One adapter per enabled source
    pub fn build_sources(&self, metadata: Option<Arc<dyn MetadataPort>>) -> Vec<Source> {
        let s = &self.discovery.sources;
        let mut sources = Vec::new();
        if s.helius_logs {
            sources.push(Source::HeliusLogs(HeliusLogsSource::new(self.into(), metadata.clone())));
        }
        if s.pumpportal_ws {
            sources.push(Source::PumpPortal(PumpPortalSource::new(self.into(), metadata)));
        }
        if s.raydium_pools {
            sources.push(Source::RaydiumPools(RaydiumPoolsSource::new(self.into())));
        }
        if s.mock_firehose {
            sources.push(Source::MockFirehose(MockFirehoseSource::new(self.into())));
        }
        sources
    }
}

impl From<&Config> for AdmissionConfig {
    fn from(config: &Config) -> Self {
        let d = &config.discovery;
        AdmissionConfig {
            min_liq_usd: d.min_liq_usd,
            min_liq_fresh_usd: d.min_liq_fresh_usd,
            max_top10_share: d.max_top10_share,
            max_top10_share_fresh: d.max_top10_share_fresh,
            score_threshold: d.score_threshold,
            min_score_cap_delta: d.min_score_cap_delta,
            fresh_window_secs: d.fresh_window_sec as f64,
            candidate_ttl_secs: d.candidate_ttl_sec as f64,
            trade_min_unique_buyers: d.fresh_pass.min_unique_buyers,
            trade_min_trades: d.fresh_pass.min_trades,
            mature_min_unique_buyers: d.fresh_pass.mature_min_unique_buyers,
            fresh_pass_enabled: d.fresh_pass.enabled,
            fresh_sources: d.fresh_pass.sources.clone(),
        }
    }
}

impl From<&Config> for ScoringConfig {
    fn from(config: &Config) -> Self {
        let d = &config.discovery;
        ScoringConfig {
            min_liq_usd: d.min_liq_usd,
            max_top10_share: d.max_top10_share,
            multi_source_bonus: d.multi_source_bonus,
            multi_source_window_secs: d.multi_source_window_sec,
            ..ScoringConfig::default()
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        let d = &config.discovery;
        EngineConfig {
            batch_size: d.batch_size,
            enrich_concurrency: d.enrich_concurrency,
            enrich_timeout: Duration::from_millis(d.enrich_timeout_ms),
            max_candidates: d.max_candidates,
            scoring: config.into(),
            admission: config.into(),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        let s = &config.scheduler;
        SchedulerConfig {
            interval: Duration::from_secs(s.interval_sec),
            align_start: s.align_start,
            startup_watchdog: Duration::from_secs(s.startup_watchdog_sec),
            manual_trigger_poll: Duration::from_secs(s.manual_trigger_poll_sec.max(1)),
            heartbeat: Duration::from_secs(s.heartbeat_sec.max(1)),
            shutdown_timeout: Duration::from_secs(s.shutdown_timeout_sec),
            max_cycles: s.max_cycles,
            max_runtime: s.max_runtime_sec.map(Duration::from_secs),
            kill_switch_path: s.kill_switch_path.as_ref().map(PathBuf::from),
            ..SchedulerConfig::default()
        }
        .with_runtime_dir(s.runtime_dir())
    }
}

impl From<&Config> for TokenDataConfig {
    fn from(config: &Config) -> Self {
        TokenDataConfig {
            request_timeout: Duration::from_secs(config.rpc.request_timeout_sec),
            commitment: config.rpc.commitment.clone(),
        }
    }
}

impl From<&Config> for HeliusLogsConfig {
    fn from(config: &Config) -> Self {
        let d = &config.discovery;
        let mut c = HeliusLogsConfig::new(d.sources.helius_ws_url.clone());
        c.programs = d.program_ids.clone();
        c.stream.reconnect_delay = Duration::from_secs(d.sources.reconnect_delay_sec);
        c.metadata_timeout = Duration::from_millis(config.rpc.metadata_timeout_ms);
        c
    }
}

impl From<&Config> for PumpPortalConfig {
    fn from(config: &Config) -> Self {
        let s = &config.discovery.sources;
        let mut c = PumpPortalConfig::default();
        c.stream.url = s.pumpportal_ws_url.clone();
        c.stream.reconnect_delay = Duration::from_secs(s.reconnect_delay_sec);
        c.track_trades = s.track_trades;
        c.max_trade_subscriptions = s.max_trade_subscriptions;
        c.metadata_timeout = Duration::from_millis(config.rpc.metadata_timeout_ms);
        c
    }
}

impl From<&Config> for RaydiumPoolsConfig {
    fn from(config: &Config) -> Self {
        let s = &config.discovery.sources;
        let mut c = RaydiumPoolsConfig::new(s.raydium_ws_url.clone());
        c.subscribe_message = s.raydium_subscribe.clone();
        c.stream.reconnect_delay = Duration::from_secs(s.reconnect_delay_sec);
        c
    }
}

impl From<&Config> for MockFirehoseConfig {
    fn from(config: &Config) -> Self {
        let s = &config.discovery.sources;
        MockFirehoseConfig {
            rate_per_sec: s.mock_rate_per_sec,
            limit: s.mock_limit,
            seed: s.mock_seed,
            ..MockFirehoseConfig::default()
        }
    }
}
