pub mod cycle_events;
pub mod engine;
pub mod freshness;
pub mod queue;
pub mod scheduler;

pub use cycle_events::{CycleEvent, CycleEventWriter, EventLogError};
pub use engine::{CycleSummary, DiscoveryEngine, EngineConfig, EngineError, EngineStats};
pub use freshness::{FreshnessCache, Sighting};
pub use queue::{candidate_queue, QueueConsumer, QueueItem, QueueProducer, QueueStats};
pub use scheduler::{CycleScheduler, SchedulerConfig, SchedulerError, SchedulerState, SchedulerStatus};
