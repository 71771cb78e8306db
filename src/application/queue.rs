//! Candidate queue
//!
//! Bounded FIFO between source adapters and the discovery engine. Producers
//! never wait: when the queue is full the new item is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::{Candidate, TradeUpdate};

/// Default queue capacity
pub const DEFAULT_MAX_QUEUE: usize = 2000;

/// Anything a source can hand to the engine
#[derive(Debug, Clone)]
pub enum QueueItem {
    Candidate(Candidate),
    Trade(TradeUpdate),
}

impl QueueItem {
    pub fn mint(&self) -> &str {
        match self {
            QueueItem::Candidate(c) => &c.mint,
            QueueItem::Trade(t) => &t.mint,
        }
    }
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    pushed: AtomicU64,
    dropped: AtomicU64,
}

/// Cloneable producer side handed to every source
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<QueueItem>,
    counters: Arc<Counters>,
}

/// Single consumer side owned by the engine
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<QueueItem>,
    tx: mpsc::Sender<QueueItem>,
    counters: Arc<Counters>,
}

/// Create a bounded queue
pub fn candidate_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(Counters::default());
    (
        QueueProducer {
            tx: tx.clone(),
            counters: counters.clone(),
        },
        QueueConsumer { rx, tx, counters },
    )
}

impl QueueProducer {
    /// Non-blocking push. Returns false if the item was dropped.
    pub fn push(&self, item: QueueItem) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.counters.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn push_candidate(&self, candidate: Candidate) -> bool {
        self.push(QueueItem::Candidate(candidate))
    }

    pub fn push_trade(&self, trade: TradeUpdate) -> bool {
        self.push(QueueItem::Trade(trade))
    }

    pub fn stats(&self) -> QueueStats {
        stats_for(&self.tx, &self.counters)
    }
}

impl QueueConsumer {
    /// Take up to `max` items without waiting
    pub fn drain(&mut self, max: usize) -> Vec<QueueItem> {
        let mut batch = Vec::with_capacity(max.min(self.len()));
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        stats_for(&self.tx, &self.counters)
    }

    /// Producer handle for this queue
    pub fn producer(&self) -> QueueProducer {
        QueueProducer {
            tx: self.tx.clone(),
            counters: self.counters.clone(),
        }
    }
}

fn stats_for(tx: &mpsc::Sender<QueueItem>, counters: &Counters) -> QueueStats {
    QueueStats {
        len: tx.max_capacity() - tx.capacity(),
        capacity: tx.max_capacity(),
        pushed: counters.pushed.load(Ordering::Relaxed),
        dropped: counters.dropped.load(Ordering::Relaxed),
    }
}
