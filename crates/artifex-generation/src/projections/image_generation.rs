//! Per-aggregate read model, folded one event at a time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::GenerationStatus;
use crate::domain::events::{GenerationEvent, GenerationEventKind, GenerationResult};

/// Read model for one generation job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationProjection {
    /// The aggregate this projection mirrors.
    pub aggregate_id: Uuid,
    /// The requesting user, when known.
    pub user_id: Option<Uuid>,
    /// Current lifecycle state.
    pub status: GenerationStatus,
    /// Last reported progress percentage.
    pub progress_percentage: u8,
    /// The prompt the job was created with.
    pub prompt: String,
    /// 1-based attempt counter.
    pub attempt: u32,
    /// When the job was requested.
    pub created_at: DateTime<Utc>,
    /// When the projection last changed.
    pub updated_at: DateTime<Utc>,
    /// Output of a completed job.
    pub result: Option<GenerationResult>,
    /// Failure description of a failed job.
    pub error: Option<String>,
    /// Version of the last event folded in. Guards idempotent redelivery.
    pub last_applied_version: i64,
}

/// Pure fold: applies one event to the projection slot.
///
/// Returns `true` when the event was newly applied; `false` when it was a
/// stale redelivery (`sequence_number <= last_applied_version`) or an
/// out-of-order event for a projection that does not exist yet. Redelivering
/// an already-applied event leaves the projection byte-identical.
pub fn apply(slot: &mut Option<ImageGenerationProjection>, event: &GenerationEvent) -> bool {
    let meta = &event.metadata;
    match slot {
        None => {
            let GenerationEventKind::Requested(payload) = &event.kind else {
                return false;
            };
            *slot = Some(ImageGenerationProjection {
                aggregate_id: meta.aggregate_id,
                user_id: meta.user_id,
                status: GenerationStatus::Requested,
                progress_percentage: 0,
                prompt: payload.prompt.clone(),
                attempt: 1,
                created_at: meta.occurred_at,
                updated_at: meta.occurred_at,
                result: None,
                error: None,
                last_applied_version: meta.sequence_number,
            });
            true
        }
        Some(projection) => {
            if meta.sequence_number <= projection.last_applied_version {
                return false;
            }
            match &event.kind {
                GenerationEventKind::Requested(payload) => {
                    // Should not happen past version 1; fold it anyway so
                    // replay from scratch stays total.
                    projection.status = GenerationStatus::Requested;
                    projection.prompt = payload.prompt.clone();
                }
                GenerationEventKind::Validated => {
                    projection.status = GenerationStatus::Validated;
                }
                GenerationEventKind::Queued => {
                    projection.status = GenerationStatus::Queued;
                }
                GenerationEventKind::Started => {
                    projection.status = GenerationStatus::Processing;
                }
                GenerationEventKind::Progress(payload) => {
                    projection.progress_percentage = payload.progress;
                }
                GenerationEventKind::Completed(payload) => {
                    projection.status = GenerationStatus::Completed;
                    projection.progress_percentage = 100;
                    projection.result = Some(payload.result.clone());
                }
                GenerationEventKind::Failed(payload) => {
                    projection.status = GenerationStatus::Failed;
                    projection.error = Some(payload.error.clone());
                }
                GenerationEventKind::Cancelled(_) => {
                    projection.status = GenerationStatus::Cancelled;
                }
                GenerationEventKind::Retried(payload) => {
                    projection.status = GenerationStatus::Queued;
                    projection.progress_percentage = 0;
                    projection.attempt = payload.attempt;
                    projection.error = None;
                }
            }
            projection.updated_at = meta.occurred_at;
            projection.last_applied_version = meta.sequence_number;
            true
        }
    }
}
