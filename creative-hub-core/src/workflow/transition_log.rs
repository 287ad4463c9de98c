//! Bounded history of stage transitions
//!
//! Backed by `crossbeam_queue::ArrayQueue`; once full, the oldest entry is
//! evicted for each new one.

use crate::models::StageId;
use chrono::{DateTime, Utc};
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of transitions kept per session
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// What caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Start,
    Advance,
    Retreat,
    Jump,
    Modify,
    Retry,
    Cancel,
    Reset,
    Complete,
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub kind: TransitionKind,
    pub from: StageId,
    pub to: StageId,
    pub at: DateTime<Utc>,
}

impl StageTransition {
    pub fn new(kind: TransitionKind, from: StageId, to: StageId) -> Self {
        Self {
            kind,
            from,
            to,
            at: Utc::now(),
        }
    }
}

/// Ring buffer of the most recent transitions
pub struct TransitionLog {
    queue: ArrayQueue<StageTransition>,
    eviction_count: AtomicU64,
}

impl TransitionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            eviction_count: AtomicU64::new(0),
        }
    }

    /// Append a transition, evicting the oldest when full
    pub fn record(&self, transition: StageTransition) {
        let mut pending = transition;
        loop {
            match self.queue.push(pending) {
                Ok(()) => return,
                Err(rejected) => {
                    if self.queue.pop().is_some() {
                        self.eviction_count.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = rejected;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of transitions dropped to make room
    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }

    /// Oldest-first copy of the log.
    ///
    /// Drains and refills the queue, so callers must hold the owning session
    /// exclusively.
    pub fn snapshot(&self) -> Vec<StageTransition> {
        let mut items = Vec::with_capacity(self.queue.len());
        while let Some(item) = self.queue.pop() {
            items.push(item);
        }
        for item in &items {
            let _ = self.queue.push(item.clone());
        }
        items
    }

    /// Rebuild a log from a saved snapshot
    pub fn from_entries(capacity: usize, entries: Vec<StageTransition>) -> Self {
        let log = Self::new(capacity);
        for entry in entries {
            log.record(entry);
        }
        log
    }
}

impl Default for TransitionLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl std::fmt::Debug for TransitionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("eviction_count", &self.eviction_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_order() {
        let log = TransitionLog::new(4);
        log.record(StageTransition::new(
            TransitionKind::Start,
            StageId::Story,
            StageId::Story,
        ));
        log.record(StageTransition::new(
            TransitionKind::Advance,
            StageId::Story,
            StageId::Script,
        ));

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, TransitionKind::Start);
        assert_eq!(entries[1].to, StageId::Script);
        // snapshot leaves the log intact
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_log_evicts_oldest() {
        let log = TransitionLog::new(3);
        for kind in [
            TransitionKind::Start,
            TransitionKind::Advance,
            TransitionKind::Retreat,
            TransitionKind::Jump,
            TransitionKind::Reset,
        ] {
            log.record(StageTransition::new(kind, StageId::Story, StageId::Story));
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.eviction_count(), 2);
        let kinds: Vec<_> = log.snapshot().into_iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransitionKind::Retreat,
                TransitionKind::Jump,
                TransitionKind::Reset
            ]
        );
    }
}
