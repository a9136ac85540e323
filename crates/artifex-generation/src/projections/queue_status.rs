//! Global queue-status read model.
//!
//! Maintained incrementally as aggregates cross the `queued` / `processing` /
//! terminal boundaries; never recomputed by scanning in the hot path. The
//! insertion-ordered queue also answers queue-position queries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::events::{GenerationEvent, GenerationEventKind};

/// Snapshot of the global queue, served by `GetSystemMetrics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusProjection {
    /// Jobs waiting in the queue.
    pub total_in_queue: usize,
    /// Jobs currently processing.
    pub processing: usize,
    /// Running mean of queued-to-started time, in milliseconds.
    pub average_wait_ms: i64,
    /// Running mean of started-to-finished time, in milliseconds.
    pub average_processing_ms: i64,
    /// Workers the deployment has available.
    pub workers_available: u32,
    /// Estimated time until the next queued job starts, in milliseconds.
    pub estimated_next_start_ms: i64,
}

/// Mutable accumulator behind [`QueueStatusProjection`].
#[derive(Debug)]
pub struct QueueStatusState {
    workers_available: u32,
    // Insertion order is queue order.
    queued: Vec<Uuid>,
    queued_at: HashMap<Uuid, DateTime<Utc>>,
    started_at: HashMap<Uuid, DateTime<Utc>>,
    wait_sum_ms: i64,
    wait_count: i64,
    processing_sum_ms: i64,
    processing_count: i64,
}

impl QueueStatusState {
    /// Creates an empty accumulator for a deployment with
    /// `workers_available` workers.
    #[must_use]
    pub fn new(workers_available: u32) -> Self {
        Self {
            workers_available,
            queued: Vec::new(),
            queued_at: HashMap::new(),
            started_at: HashMap::new(),
            wait_sum_ms: 0,
            wait_count: 0,
            processing_sum_ms: 0,
            processing_count: 0,
        }
    }

    /// Folds one committed event into the queue counters.
    pub fn apply(&mut self, event: &GenerationEvent) {
        let aggregate_id = event.metadata.aggregate_id;
        let occurred_at = event.metadata.occurred_at;
        match &event.kind {
            GenerationEventKind::Queued | GenerationEventKind::Retried(_) => {
                if !self.queued.contains(&aggregate_id) {
                    self.queued.push(aggregate_id);
                    self.queued_at.insert(aggregate_id, occurred_at);
                }
            }
            GenerationEventKind::Started => {
                self.queued.retain(|id| *id != aggregate_id);
                if let Some(enqueued) = self.queued_at.remove(&aggregate_id) {
                    self.wait_sum_ms += (occurred_at - enqueued).num_milliseconds();
                    self.wait_count += 1;
                }
                self.started_at.insert(aggregate_id, occurred_at);
            }
            GenerationEventKind::Completed(_) | GenerationEventKind::Failed(_) => {
                if let Some(started) = self.started_at.remove(&aggregate_id) {
                    self.processing_sum_ms += (occurred_at - started).num_milliseconds();
                    self.processing_count += 1;
                }
            }
            GenerationEventKind::Cancelled(_) => {
                // A cancellation leaves whichever side it was on.
                self.queued.retain(|id| *id != aggregate_id);
                self.queued_at.remove(&aggregate_id);
                self.started_at.remove(&aggregate_id);
            }
            GenerationEventKind::Requested(_)
            | GenerationEventKind::Validated
            | GenerationEventKind::Progress(_) => {}
        }
    }

    /// 1-based position of an aggregate in the queue, `None` when it is not
    /// queued.
    #[must_use]
    pub fn position(&self, aggregate_id: Uuid) -> Option<usize> {
        self.queued.iter().position(|id| *id == aggregate_id).map(|i| i + 1)
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> QueueStatusProjection {
        let average_wait_ms = if self.wait_count > 0 {
            self.wait_sum_ms / self.wait_count
        } else {
            0
        };
        let average_processing_ms = if self.processing_count > 0 {
            self.processing_sum_ms / self.processing_count
        } else {
            0
        };
        QueueStatusProjection {
            total_in_queue: self.queued.len(),
            processing: self.started_at.len(),
            average_wait_ms,
            average_processing_ms,
            workers_available: self.workers_available,
            estimated_next_start_ms: self.estimate_next_start(average_processing_ms),
        }
    }

    /// Batches ahead of the next queued job times the average batch
    /// duration. Zero when the queue is empty or no average exists yet.
    #[allow(clippy::cast_possible_wrap)]
    fn estimate_next_start(&self, average_processing_ms: i64) -> i64 {
        if self.queued.is_empty() || self.workers_available == 0 {
            return 0;
        }
        let batches = self.queued.len().div_ceil(self.workers_available as usize) as i64;
        batches * average_processing_ms
    }
}
