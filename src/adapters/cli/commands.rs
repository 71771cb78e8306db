//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the discovery service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::adapters::sources::SourceAdapter;
use crate::adapters::token_data::TokenDataClient;
use crate::application::cycle_events::{read_last_cycle, LAST_CYCLE_FILE};
use crate::application::{candidate_queue, CycleScheduler, DiscoveryEngine, SchedulerConfig, SchedulerError};
use crate::config::{load_config, Config};
use crate::ports::{MetadataPort, SystemClock, TokenDataPort};

/// Butters Discovery - new-token discovery and scoring for Solana
#[derive(Parser, Debug)]
#[command(
    name = "butters-discovery",
    version = env!("CARGO_PKG_VERSION"),
    about = "New-token discovery and scoring for Solana",
    long_about = "Collects freshly created tokens from streaming sources, enriches them \
                  through a failover RPC pool and ranks them on a fixed cycle."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start sources and the cycle scheduler
    Run(RunCmd),

    /// Probe the RPC pool and print its status
    Status(StatusCmd),

    /// Ask a running scheduler for an out-of-band cycle
    Trigger(TriggerCmd),
}

/// Start the discovery loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/discovery.toml")]
    pub config: PathBuf,

    /// Stop after this many cycles
    #[arg(long, value_name = "N")]
    pub max_cycles: Option<u64>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    pub max_runtime: Option<u64>,

    /// Skip alignment to the interval boundary
    #[arg(long)]
    pub align_now: bool,
}

impl RunCmd {
    /// Flags win over file and environment
    pub fn apply(&self, config: &mut Config) {
        if let Some(n) = self.max_cycles {
            config.scheduler.max_cycles = Some(n);
        }
        if let Some(secs) = self.max_runtime {
            config.scheduler.max_runtime_sec = Some(secs);
        }
        if self.align_now {
            config.scheduler.align_start = false;
        }
    }
}

/// Check RPC pool status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/discovery.toml")]
    pub config: PathBuf,
}

/// Touch the manual trigger file
#[derive(Parser, Debug)]
pub struct TriggerCmd {
    /// Runtime directory of the running scheduler
    #[arg(long, value_name = "DIR", default_value = ".runtime")]
    pub runtime_dir: PathBuf,
}

/// Execute the parsed command
pub async fn execute(app: CliApp) -> Result<()> {
    match app.command {
        Command::Run(ref cmd) => {
            let mut config = load_config(&cmd.config).context("Failed to load configuration")?;
            cmd.apply(&mut config);
            init_logging(&app, &config)?;
            run_command(config).await
        }
        Command::Status(ref cmd) => {
            let config = load_config(&cmd.config).context("Failed to load configuration")?;
            init_logging(&app, &config)?;
            status_command(config).await
        }
        Command::Trigger(ref cmd) => trigger_command(cmd),
    }
}

/// `RUST_LOG` wins, then `--debug` / `--verbose`, then the config level
fn init_logging(app: &CliApp, config: &Config) -> Result<()> {
    let level = if app.debug {
        "debug"
    } else if app.verbose {
        "info"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if app.json || config.logging.json {
        fmt().json().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))
}

async fn run_command(config: Config) -> Result<()> {
    tracing::info!("Starting butters-discovery...");

    let token_data = match config.build_rpc_pool().context("Failed to build RPC pool")? {
        Some(pool) => Some(Arc::new(
            TokenDataClient::with_config(Arc::new(pool), (&config).into())
                .context("Failed to create token data client")?,
        )),
        None => {
            tracing::warn!("No RPC endpoints configured, candidates will not be enriched");
            None
        }
    };

    let (producer, consumer) = candidate_queue(config.discovery.max_queue);
    let mut engine = DiscoveryEngine::new((&config).into(), consumer, Arc::new(SystemClock))
        .context("Failed to create discovery engine")?;
    if let Some(client) = &token_data {
        engine = engine.with_token_data(client.clone() as Arc<dyn TokenDataPort>);
    }

    let metadata = token_data.map(|c| c as Arc<dyn MetadataPort>);
    let sources: Vec<Arc<dyn SourceAdapter>> = config
        .build_sources(metadata)
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn SourceAdapter>)
        .collect();
    tracing::info!(
        sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Sources configured"
    );

    let scheduler = Arc::new(
        CycleScheduler::new(SchedulerConfig::from(&config), engine, sources, producer)
            .context("Failed to create scheduler")?,
    );

    // Setup Ctrl+C handler
    let sched = scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            match sched.stop().await {
                Ok(()) => {}
                Err(e @ SchedulerError::ShutdownTimeout { .. }) => {
                    // an in-flight cycle or source is still holding on
                    tracing::error!(error = %e, "Shutdown timed out, forcing exit");
                    std::process::exit(1);
                }
                Err(e) => tracing::error!(error = %e, "Shutdown did not complete cleanly"),
            }
        }
    });

    scheduler.clone().start().await.context("Scheduler shutdown failed")?;

    let engine = scheduler.engine();
    let mut engine = engine.lock().await;
    for c in engine.best_candidates(5, None) {
        tracing::info!(mint = %c.mint, symbol = %c.symbol, score = c.overall_score, "Top candidate");
    }
    tracing::info!(run_id = %scheduler.run_id(), "butters-discovery stopped");
    Ok(())
}

async fn status_command(config: Config) -> Result<()> {
    let pool = config
        .build_rpc_pool()
        .context("Failed to build RPC pool")?
        .context("No RPC endpoints configured (rpc.urls or SOLANA_RPC_URLS)")?;
    let endpoints = config.rpc.urls.len();
    let client = TokenDataClient::with_config(Arc::new(pool), (&config).into())?;

    // one probe per endpoint so round-robin touches each of them
    for _ in 0..endpoints {
        if let Err(e) = client.health().await {
            tracing::warn!(error = %e, "Health probe failed");
        }
    }

    let status = client.pool().get_status()?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    let last_cycle = config.scheduler.runtime_dir().join(LAST_CYCLE_FILE);
    if let Ok(Some(event)) = read_last_cycle(&last_cycle) {
        println!("{}", serde_json::to_string_pretty(&event)?);
    }
    Ok(())
}

fn trigger_command(cmd: &TriggerCmd) -> Result<()> {
    std::fs::create_dir_all(&cmd.runtime_dir)
        .with_context(|| format!("Failed to create {}", cmd.runtime_dir.display()))?;
    let path = cmd.runtime_dir.join("trigger_cycle");
    std::fs::write(&path, b"").with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Trigger written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_app_parse_run() {
        let args = vec!["butters-discovery", "run", "--config", "custom.toml"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("custom.toml"));
                assert_eq!(cmd.max_cycles, None);
                assert!(!cmd.align_now);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_app_parse_run_with_bounds() {
        let args = vec![
            "butters-discovery", "run",
            "--max-cycles", "3",
            "--max-runtime", "120",
            "--align-now",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.max_cycles, Some(3));
                assert_eq!(cmd.max_runtime, Some(120));
                assert!(cmd.align_now);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_flags_override_config() {
        let app = CliApp::try_parse_from(vec!["butters-discovery", "run", "--max-cycles", "2", "--align-now"]).unwrap();
        let Command::Run(cmd) = app.command else {
            panic!("Expected Run command");
        };
        let mut config = Config::default();
        config.scheduler.max_cycles = Some(50);
        cmd.apply(&mut config);
        assert_eq!(config.scheduler.max_cycles, Some(2));
        assert!(!config.scheduler.align_start);
        assert_eq!(config.scheduler.max_runtime_sec, None);
    }

    #[test]
    fn test_cli_app_parse_status() {
        let args = vec!["butters-discovery", "status"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Status(cmd) => {
                assert_eq!(cmd.config, PathBuf::from("config/discovery.toml"));
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = vec!["butters-discovery", "-v", "--debug", "--json", "status"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(app.verbose);
        assert!(app.debug);
        assert!(app.json);
    }

    #[test]
    fn test_trigger_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let runtime_dir = dir.path().join("rt");
        let app = CliApp::try_parse_from(vec![
            "butters-discovery",
            "trigger",
            "--runtime-dir",
            runtime_dir.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Trigger(cmd) = app.command else {
            panic!("Expected Trigger command");
        };
        trigger_command(&cmd).unwrap();
        assert!(runtime_dir.join("trigger_cycle").exists());
    }
}
