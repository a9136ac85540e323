//! In-memory projection store.
//!
//! Shared across all connections; reads never block writes beyond the brief
//! `RwLock` critical sections, and may observe a snapshot momentarily stale
//! relative to an in-flight append.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::GenerationStatus;
use crate::domain::events::GenerationEvent;

use super::image_generation::{self, ImageGenerationProjection};
use super::queue_status::{QueueStatusProjection, QueueStatusState};

/// One page of a user's generation history, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHistoryPage {
    /// Projections on this page.
    pub items: Vec<ImageGenerationProjection>,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub page_size: u32,
    /// Total matching projections across all pages.
    pub total: usize,
}

/// Queryable read-model storage, mutated only via [`ProjectionStore::apply`].
pub struct ProjectionStore {
    generations: RwLock<HashMap<Uuid, ImageGenerationProjection>>,
    queue: RwLock<QueueStatusState>,
}

impl ProjectionStore {
    /// Creates an empty store for a deployment with `workers_available`
    /// workers.
    #[must_use]
    pub fn new(workers_available: u32) -> Self {
        Self {
            generations: RwLock::new(HashMap::new()),
            queue: RwLock::new(QueueStatusState::new(workers_available)),
        }
    }

    /// Folds one committed event into both read models.
    ///
    /// Returns `true` when the event was newly applied; a stale redelivery
    /// updates nothing and returns `false`, keeping queue counters from
    /// double counting.
    pub fn apply(&self, event: &GenerationEvent) -> bool {
        let aggregate_id = event.metadata.aggregate_id;
        let applied = {
            let mut generations = self
                .generations
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let mut slot = generations.remove(&aggregate_id);
            let applied = image_generation::apply(&mut slot, event);
            if let Some(projection) = slot {
                generations.insert(aggregate_id, projection);
            }
            applied
        };
        if applied {
            self.queue
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .apply(event);
        }
        applied
    }

    /// Returns the projection for one aggregate, if it exists.
    #[must_use]
    pub fn generation(&self, aggregate_id: Uuid) -> Option<ImageGenerationProjection> {
        self.generations
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&aggregate_id)
            .cloned()
    }

    /// Returns a page of one user's generations, newest first.
    #[must_use]
    pub fn user_history(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
        status: Option<GenerationStatus>,
    ) -> UserHistoryPage {
        let generations = self
            .generations
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut items: Vec<ImageGenerationProjection> = generations
            .values()
            .filter(|p| p.user_id == Some(user_id))
            .filter(|p| status.is_none_or(|wanted| p.status == wanted))
            .cloned()
            .collect();
        drop(generations);

        // Newest first; aggregate id breaks creation-time ties so paging
        // is stable.
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.aggregate_id.cmp(&a.aggregate_id))
        });

        let total = items.len();
        let page = page.max(1);
        let start = (page as usize - 1).saturating_mul(page_size as usize);
        let items: Vec<ImageGenerationProjection> = items
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();

        UserHistoryPage {
            items,
            page,
            page_size,
            total,
        }
    }

    /// 1-based queue position for an aggregate, `None` when not queued.
    #[must_use]
    pub fn queue_position(&self, aggregate_id: Uuid) -> Option<usize> {
        self.queue
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .position(aggregate_id)
    }

    /// Current global queue snapshot.
    #[must_use]
    pub fn queue_status(&self) -> QueueStatusProjection {
        self.queue
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .snapshot()
    }
}

#[cfg(test)]
mod tests {
    use artifex_core::event::EventMetadata;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::domain::events::{
        GenerationEventKind, GenerationParameters, ImageGenerationRequested,
    };

    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    fn event(
        aggregate_id: Uuid,
        sequence_number: i64,
        user_id: Option<Uuid>,
        kind: GenerationEventKind,
        occurred_at: DateTime<Utc>,
    ) -> GenerationEvent {
        GenerationEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().as_str().to_owned(),
                aggregate_id,
                sequence_number,
                correlation_id: Uuid::new_v4(),
                causation_id: Uuid::new_v4(),
                user_id,
                occurred_at,
            },
            kind,
        }
    }

    fn requested(aggregate_id: Uuid, user_id: Uuid, occurred_at: DateTime<Utc>) -> GenerationEvent {
        event(
            aggregate_id,
            1,
            Some(user_id),
            GenerationEventKind::Requested(ImageGenerationRequested {
                prompt: "sunset".to_owned(),
                parameters: GenerationParameters::default(),
            }),
            occurred_at,
        )
    }

    #[test]
    fn test_apply_updates_generation_and_queue_views() {
        let store = ProjectionStore::new(1);
        let aggregate_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        store.apply(&requested(aggregate_id, user_id, at(0)));
        store.apply(&event(aggregate_id, 2, None, GenerationEventKind::Validated, at(1)));
        store.apply(&event(aggregate_id, 3, None, GenerationEventKind::Queued, at(1)));

        let projection = store.generation(aggregate_id).unwrap();
        assert_eq!(projection.status, GenerationStatus::Queued);
        assert_eq!(store.queue_position(aggregate_id), Some(1));
        assert_eq!(store.queue_status().total_in_queue, 1);
    }

    #[test]
    fn test_stale_redelivery_does_not_double_count_queue_entries() {
        let store = ProjectionStore::new(1);
        let aggregate_id = Uuid::new_v4();

        store.apply(&requested(aggregate_id, Uuid::new_v4(), at(0)));
        let queued = event(aggregate_id, 2, None, GenerationEventKind::Queued, at(1));
        assert!(store.apply(&queued));
        assert!(!store.apply(&queued));

        assert_eq!(store.queue_status().total_in_queue, 1);
    }

    #[test]
    fn test_user_history_is_paginated_newest_first() {
        let store = ProjectionStore::new(1);
        let user_id = Uuid::new_v4();

        let mut ids = Vec::new();
        for i in 0..5 {
            let aggregate_id = Uuid::new_v4();
            store.apply(&requested(aggregate_id, user_id, at(i)));
            ids.push(aggregate_id);
        }
        // Another user's job must not appear.
        store.apply(&requested(Uuid::new_v4(), Uuid::new_v4(), at(10)));

        let first_page = store.user_history(user_id, 1, 2, None);
        assert_eq!(first_page.total, 5);
        assert_eq!(first_page.items.len(), 2);
        assert_eq!(first_page.items[0].aggregate_id, ids[4]);
        assert_eq!(first_page.items[1].aggregate_id, ids[3]);

        let last_page = store.user_history(user_id, 3, 2, None);
        assert_eq!(last_page.items.len(), 1);
        assert_eq!(last_page.items[0].aggregate_id, ids[0]);
    }

    #[test]
    fn test_user_history_filters_by_status() {
        let store = ProjectionStore::new(1);
        let user_id = Uuid::new_v4();

        let queued_job = Uuid::new_v4();
        store.apply(&requested(queued_job, user_id, at(0)));
        store.apply(&event(queued_job, 2, None, GenerationEventKind::Queued, at(1)));

        let fresh_job = Uuid::new_v4();
        store.apply(&requested(fresh_job, user_id, at(2)));

        let queued_only = store.user_history(user_id, 1, 10, Some(GenerationStatus::Queued));
        assert_eq!(queued_only.total, 1);
        assert_eq!(queued_only.items[0].aggregate_id, queued_job);
    }
}
