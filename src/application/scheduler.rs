//! Cycle Scheduler
//!
//! Drives engine cycles on a fixed cadence and owns the process lifecycle.
//! Key features:
//! - Deadlines advance by exactly one interval, so cadence does not drift
//! - Optional alignment of the first cycle to a wall-clock boundary
//! - Startup watchdog, manual trigger file and idle heartbeat
//! - Kill switch file, cycle and runtime limits
//! - Idempotent shutdown with bounded waits and a step trace

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cycle_events::{
    append_trace, generate_run_id, CycleEvent, CycleEventWriter, EventLogError, SHUTDOWN_TRACE_FILE,
};
use super::engine::{DiscoveryEngine, EngineError, EngineStats};
use super::queue::QueueProducer;
use crate::adapters::sources::SourceAdapter;

/// Idle time after which the heartbeat starts logging
pub const HEARTBEAT_IDLE_SECS: u64 = 20;
/// Recent cycle start instants kept for status and tests
const RECENT_STARTS: usize = 32;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already started")]
    AlreadyRunning,

    #[error("Shutdown exceeded {timeout_secs}s waiting for {waiting_for}")]
    ShutdownTimeout { waiting_for: String, timeout_secs: u64 },

    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Wait for the next wall-clock interval boundary before the first cycle
    pub align_start: bool,
    pub startup_watchdog: Duration,
    pub manual_trigger_poll: Duration,
    pub heartbeat: Duration,
    pub shutdown_timeout: Duration,
    /// Bounded wait for watcher tasks during shutdown
    pub watcher_join_timeout: Duration,
    pub max_cycles: Option<u64>,
    pub max_runtime: Option<Duration>,
    pub runtime_dir: PathBuf,
    pub trigger_path: PathBuf,
    pub kill_switch_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let runtime_dir = PathBuf::from(".runtime");
        Self {
            interval: Duration::from_secs(60),
            align_start: true,
            startup_watchdog: Duration::from_secs(5),
            manual_trigger_poll: Duration::from_secs(1),
            heartbeat: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(12),
            watcher_join_timeout: Duration::from_secs(2),
            max_cycles: None,
            max_runtime: None,
            trigger_path: runtime_dir.join("trigger_cycle"),
            runtime_dir,
            kill_switch_path: None,
        }
    }
}

impl SchedulerConfig {
    /// Keep all runtime files under `dir`
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.trigger_path = dir.join("trigger_cycle");
        self.runtime_dir = dir;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Aligning,
    Running { cycle: u64 },
    Waiting,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleTrigger {
    Scheduled,
    Watchdog,
    Manual,
}

impl CycleTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            CycleTrigger::Scheduled => "scheduled",
            CycleTrigger::Watchdog => "watchdog",
            CycleTrigger::Manual => "manual",
        }
    }
}

/// Status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub run_id: String,
    pub cycles: u64,
    pub uptime_secs: u64,
    /// Absent while a cycle holds the engine
    pub engine: Option<EngineStats>,
}

/// Delay until the next multiple of `interval` since the Unix epoch
pub fn align_delay(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis() as i64;
    if interval_ms <= 0 {
        return Duration::ZERO;
    }
    let into = now.timestamp_millis().rem_euclid(interval_ms);
    if into == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((interval_ms - into) as u64)
    }
}

pub struct CycleScheduler {
    config: SchedulerConfig,
    /// Cycle lock: scheduled, watchdog and manual cycles all go through it
    engine: Arc<Mutex<DiscoveryEngine>>,
    engine_cancel: CancellationToken,
    sources: Vec<Arc<dyn SourceAdapter>>,
    queue: QueueProducer,
    events: CycleEventWriter,
    run_id: String,
    state: StdMutex<SchedulerState>,
    cycles: AtomicU64,
    cycle_begun: AtomicBool,
    started: AtomicBool,
    stopping: AtomicBool,
    shutdown_timed_out: AtomicBool,
    heartbeats: AtomicU64,
    last_cycle_end: StdMutex<Option<Instant>>,
    recent_starts: StdMutex<VecDeque<Instant>>,
    /// Stops new cycles
    shutdown: CancellationToken,
    /// Stops watchdog, trigger and heartbeat tasks
    watchers: CancellationToken,
    /// Fired once the shutdown sequence has finished
    stopped: CancellationToken,
    watcher_tasks: StdMutex<Vec<JoinHandle<()>>>,
    source_tasks: StdMutex<Vec<JoinHandle<()>>>,
    created_at: Instant,
}

impl CycleScheduler {
    pub fn new(
        config: SchedulerConfig,
        engine: DiscoveryEngine,
        sources: Vec<Arc<dyn SourceAdapter>>,
        queue: QueueProducer,
    ) -> Result<Self, SchedulerError> {
        let events = CycleEventWriter::new(&config.runtime_dir)?;
        let engine_cancel = engine.cancel_token();
        Ok(Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            engine_cancel,
            sources,
            queue,
            events,
            run_id: generate_run_id(Utc::now()),
            state: StdMutex::new(SchedulerState::Idle),
            cycles: AtomicU64::new(0),
            cycle_begun: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            shutdown_timed_out: AtomicBool::new(false),
            heartbeats: AtomicU64::new(0),
            last_cycle_end: StdMutex::new(None),
            recent_starts: StdMutex::new(VecDeque::with_capacity(RECENT_STARTS)),
            shutdown: CancellationToken::new(),
            watchers: CancellationToken::new(),
            stopped: CancellationToken::new(),
            watcher_tasks: StdMutex::new(Vec::new()),
            source_tasks: StdMutex::new(Vec::new()),
            created_at: Instant::now(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Shared engine handle, e.g. for reading ranked candidates between cycles
    pub fn engine(&self) -> Arc<Mutex<DiscoveryEngine>> {
        self.engine.clone()
    }

    pub fn events(&self) -> &CycleEventWriter {
        &self.events
    }

    pub fn state(&self) -> SchedulerState {
        self.state.lock().map(|s| *s).unwrap_or(SchedulerState::Stopped)
    }

    fn set_state(&self, state: SchedulerState) {
        if let Ok(mut s) = self.state.lock() {
            // a finished shutdown is final
            if *s != SchedulerState::Stopped || state == SchedulerState::Stopped {
                *s = state;
            }
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Heartbeat ticks so far
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::SeqCst)
    }

    /// Time since the last cycle ended, or since creation if none has
    pub fn idle_for(&self) -> Duration {
        self.last_cycle_end
            .lock()
            .ok()
            .and_then(|l| *l)
            .unwrap_or(self.created_at)
            .elapsed()
    }

    /// Start instants of the most recent cycles, oldest first
    pub fn recent_cycle_starts(&self) -> Vec<Instant> {
        self.recent_starts
            .lock()
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state(),
            run_id: self.run_id.clone(),
            cycles: self.cycles(),
            uptime_secs: self.created_at.elapsed().as_secs(),
            engine: self.engine.try_lock().ok().map(|e| e.stats()),
        }
    }

    /// Run until stopped. Returns the shutdown outcome.
    pub async fn start(self: Arc<Self>) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        info!(
            run_id = %self.run_id,
            interval_secs = self.config.interval.as_secs_f64(),
            sources = self.sources.len(),
            "Scheduler starting"
        );

        self.spawn_sources();
        self.spawn_watchers();

        let runtime_deadline = self.config.max_runtime.map(|d| Instant::now() + d);

        if self.config.align_start {
            let delay = align_delay(Utc::now(), self.config.interval);
            self.set_state(SchedulerState::Aligning);
            info!(delay_ms = delay.as_millis() as u64, "Aligning first cycle to interval boundary");
            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let interval = self.config.interval;
        let mut next = Instant::now();

        while !self.shutdown.is_cancelled() {
            self.set_state(SchedulerState::Waiting);
            let runtime_sleep = async {
                match runtime_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = runtime_sleep => {
                    info!("Max runtime reached, shutting down");
                    break;
                }
                _ = tokio::time::sleep_until(next) => {}
            }

            self.run_cycle(CycleTrigger::Scheduled).await;

            if let Some(max) = self.config.max_cycles {
                if self.cycles() >= max {
                    info!(cycles = max, "Max cycles reached, shutting down");
                    break;
                }
            }

            next += interval;
            let now = Instant::now();
            if now > next {
                let behind = now - next;
                let skipped = (behind.as_nanos() / interval.as_nanos().max(1)) as u32;
                warn!(
                    overrun_ms = behind.as_millis() as u64,
                    skipped_slots = skipped,
                    "Cycle overran its slot, starting next immediately"
                );
                next += interval * skipped;
            }
        }

        self.stop().await
    }

    fn spawn_sources(&self) {
        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let source = source.clone();
            let queue = self.queue.clone();
            handles.push(tokio::spawn(async move {
                let name = source.name();
                if let Err(e) = source.run(queue).await {
                    error!(source = name, error = %e, "Source exited with error");
                }
            }));
        }
        if let Ok(mut tasks) = self.source_tasks.lock() {
            tasks.extend(handles);
        }
    }

    fn spawn_watchers(self: &Arc<Self>) {
        let handles = vec![
            tokio::spawn(self.clone().startup_watchdog()),
            tokio::spawn(self.clone().manual_trigger_watcher()),
            tokio::spawn(self.clone().heartbeat()),
        ];
        if let Ok(mut tasks) = self.watcher_tasks.lock() {
            tasks.extend(handles);
        }
    }

    /// Force a cycle if none has begun shortly after start
    async fn startup_watchdog(self: Arc<Self>) {
        tokio::select! {
            _ = self.watchers.cancelled() => return,
            _ = tokio::time::sleep(self.config.startup_watchdog) => {}
        }
        if !self.cycle_begun.load(Ordering::SeqCst) && !self.shutdown.is_cancelled() {
            warn!(
                after_secs = self.config.startup_watchdog.as_secs_f64(),
                "No cycle started yet, watchdog forcing one"
            );
            self.run_cycle(CycleTrigger::Watchdog).await;
        }
    }

    async fn manual_trigger_watcher(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.manual_trigger_poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.watchers.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if !self.config.trigger_path.exists() {
                continue;
            }
            if let Err(e) = std::fs::remove_file(&self.config.trigger_path) {
                warn!(path = %self.config.trigger_path.display(), error = %e, "Could not remove trigger file");
                continue;
            }
            info!("Manual trigger found");
            self.run_cycle(CycleTrigger::Manual).await;
        }
    }

    async fn heartbeat(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.watchers.cancelled() => return,
                _ = ticker.tick() => {}
            }
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            let idle = self.idle_for();
            if idle >= Duration::from_secs(HEARTBEAT_IDLE_SECS) {
                info!(idle_secs = idle.as_secs_f64(), state = ?self.state(), "heartbeat: scheduler alive");
            }
        }
    }

    async fn run_cycle(&self, trigger: CycleTrigger) {
        let mut engine = self.engine.lock().await;
        if self.shutdown.is_cancelled() && trigger != CycleTrigger::Scheduled {
            debug!(trigger = trigger.as_str(), "Shutdown in progress, cycle skipped");
            return;
        }

        let cycle_id = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        self.cycle_begun.store(true, Ordering::SeqCst);
        if let Ok(mut starts) = self.recent_starts.lock() {
            if starts.len() >= RECENT_STARTS {
                starts.pop_front();
            }
            starts.push_back(Instant::now());
        }
        self.set_state(SchedulerState::Running { cycle: cycle_id });
        info!(run_id = %self.run_id, cycle_id, trigger = trigger.as_str(), "Cycle start");
        if let Err(e) = self.events.write(&CycleEvent::start(&self.run_id, cycle_id, Utc::now())) {
            warn!(cycle_id, error = %e, "Could not write cycle_start");
        }

        let end = match engine.run_analysis_cycle().await {
            Ok(summary) => {
                info!(
                    run_id = %self.run_id,
                    cycle_id,
                    tokens = summary.tokens_scanned,
                    hot = summary.hot,
                    duration_ms = summary.duration_ms,
                    "Cycle end"
                );
                CycleEvent::success(&self.run_id, cycle_id, Utc::now(), summary.tokens_scanned, summary.hot)
            }
            Err(e) => {
                error!(run_id = %self.run_id, cycle_id, error = %e, "Cycle failed");
                CycleEvent::failure(&self.run_id, cycle_id, Utc::now(), e.to_string())
            }
        };
        drop(engine);

        if let Err(e) = self.events.write(&end) {
            warn!(cycle_id, error = %e, "Could not write cycle_end");
        }
        if let Ok(mut last) = self.last_cycle_end.lock() {
            *last = Some(Instant::now());
        }

        if let Some(kill) = &self.config.kill_switch_path {
            if kill.exists() {
                warn!(path = %kill.display(), "Kill switch present, shutting down");
                self.shutdown.cancel();
            }
        }
    }

    fn trace(&self, step: &str) {
        let path = self.config.runtime_dir.join(SHUTDOWN_TRACE_FILE);
        if let Err(e) = append_trace(&path, step) {
            debug!(step, error = %e, "Could not write shutdown trace");
        }
    }

    fn shutdown_timeout_error(&self) -> SchedulerError {
        SchedulerError::ShutdownTimeout {
            waiting_for: "sources and engine".to_string(),
            timeout_secs: self.config.shutdown_timeout.as_secs(),
        }
    }

    /// Stop everything. Concurrent and repeated calls wait for the first one
    /// and report its outcome.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            let bound = self.config.shutdown_timeout + self.config.watcher_join_timeout;
            let _ = tokio::time::timeout(bound, self.stopped.cancelled()).await;
            if self.shutdown_timed_out.load(Ordering::SeqCst) {
                return Err(self.shutdown_timeout_error());
            }
            return Ok(());
        }

        info!(run_id = %self.run_id, "Shutdown requested");
        self.trace("stop_requested");
        self.set_state(SchedulerState::ShuttingDown);
        self.shutdown.cancel();

        // 1. watchers
        self.watchers.cancel();
        let watchers = take_tasks(&self.watcher_tasks);
        let aborts = abort_handles(&watchers);
        if tokio::time::timeout(self.config.watcher_join_timeout, join_all(watchers))
            .await
            .is_err()
        {
            warn!("Watchers did not stop in time, aborting");
            aborts.iter().for_each(AbortHandle::abort);
            self.trace("watchers_aborted");
        } else {
            self.trace("watchers_stopped");
        }

        // 2. sources and engine
        for source in &self.sources {
            source.stop();
        }
        self.engine_cancel.cancel();
        let source_tasks = take_tasks(&self.source_tasks);
        let aborts = abort_handles(&source_tasks);
        let engine = self.engine.clone();
        let closure = async move {
            join_all(source_tasks).await;
            // waits for an in-flight cycle
            let _engine = engine.lock().await;
        };
        let timed_out = tokio::time::timeout(self.config.shutdown_timeout, closure)
            .await
            .is_err();
        if timed_out {
            error!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Sources or engine did not confirm shutdown, aborting"
            );
            aborts.iter().for_each(AbortHandle::abort);
            self.trace("components_timeout");
        } else {
            self.trace("components_stopped");
        }

        // 3. event writer
        if let Err(e) = self.events.flush() {
            warn!(error = %e, "Could not flush cycle events");
        }
        self.trace("events_flushed");

        self.shutdown_timed_out.store(timed_out, Ordering::SeqCst);
        self.set_state(SchedulerState::Stopped);
        self.trace("stopped");
        self.stopped.cancel();
        info!(run_id = %self.run_id, cycles = self.cycles(), "Scheduler stopped");

        if timed_out {
            return Err(self.shutdown_timeout_error());
        }
        Ok(())
    }
}

fn take_tasks(tasks: &StdMutex<Vec<JoinHandle<()>>>) -> Vec<JoinHandle<()>> {
    tasks.lock().map(|mut t| std::mem::take(&mut *t)).unwrap_or_default()
}

fn abort_handles(tasks: &[JoinHandle<()>]) -> Vec<AbortHandle> {
    tasks.iter().map(JoinHandle::abort_handle).collect()
}
