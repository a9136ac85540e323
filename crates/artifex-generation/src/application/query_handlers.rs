//! Query bus for the Image Generation context.
//!
//! Queries are answered exclusively from the projection store. The one
//! exception is the audit history query, which replays the raw stream and
//! is gated behind configuration.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use artifex_core::error::DomainError;
use artifex_core::query::Query;
use artifex_event_store::EventStore;

use crate::domain::aggregates::GenerationStatus;
use crate::domain::events::EventView;
use crate::projections::{
    ImageGenerationProjection, ProjectionStore, QueueStatusProjection, UserHistoryPage,
};

/// Closed enumeration of supported read requests.
#[derive(Debug, Clone)]
pub enum GenerationQueryKind {
    /// Current projection of one aggregate.
    GetImageGenerationStatus { aggregate_id: Uuid },
    /// 1-based position in the global queue.
    GetQueuePosition { aggregate_id: Uuid },
    /// Paginated, newest-first history for one user.
    GetUserGenerationHistory {
        user_id: Uuid,
        page: u32,
        page_size: u32,
        status: Option<GenerationStatus>,
    },
    /// Global queue snapshot.
    GetSystemMetrics,
    /// Raw event replay for audit/debugging. Gated.
    GetEventHistory { aggregate_id: Uuid },
}

impl GenerationQueryKind {
    /// The type name for this query.
    #[must_use]
    pub fn query_type(&self) -> &'static str {
        match self {
            Self::GetImageGenerationStatus { .. } => "GetImageGenerationStatus",
            Self::GetQueuePosition { .. } => "GetQueuePosition",
            Self::GetUserGenerationHistory { .. } => "GetUserGenerationHistory",
            Self::GetSystemMetrics => "GetSystemMetrics",
            Self::GetEventHistory { .. } => "GetEventHistory",
        }
    }
}

/// A read request with its tracing metadata.
#[derive(Debug, Clone)]
pub struct GenerationQuery {
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// What to read.
    pub kind: GenerationQueryKind,
}

impl Query for GenerationQuery {
    fn query_type(&self) -> &'static str {
        self.kind.query_type()
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Typed query results. Unknown aggregates answer `null` rather than an
/// error so cheap polling stays cheap.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    GenerationStatus(Option<ImageGenerationProjection>),
    QueuePosition(Option<usize>),
    UserHistory(UserHistoryPage),
    SystemMetrics(QueueStatusProjection),
    EventHistory(Vec<EventView>),
}

/// Errors a query can produce.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Event history queries are disabled by configuration.
    #[error("event history queries are disabled")]
    HistoryDisabled,

    /// An underlying domain/storage error.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl QueryError {
    /// Machine-readable error code for wire frames.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::HistoryDisabled => "EVENT_HISTORY_DISABLED",
            Self::Domain(err) => err.code(),
        }
    }
}

/// Receives typed queries and answers them from the read side.
pub struct QueryBus {
    projections: Arc<ProjectionStore>,
    store: Arc<EventStore>,
    event_history_enabled: bool,
}

impl QueryBus {
    /// Creates a query bus. `event_history_enabled` gates the audit replay
    /// query.
    #[must_use]
    pub fn new(
        projections: Arc<ProjectionStore>,
        store: Arc<EventStore>,
        event_history_enabled: bool,
    ) -> Self {
        Self {
            projections,
            store,
            event_history_enabled,
        }
    }

    /// Executes one query.
    ///
    /// # Errors
    ///
    /// [`QueryError::HistoryDisabled`] for a gated history query, or
    /// [`QueryError::Domain`] on storage failure during replay.
    pub async fn execute(&self, query: GenerationQuery) -> Result<QueryOutcome, QueryError> {
        match query.kind {
            GenerationQueryKind::GetImageGenerationStatus { aggregate_id } => Ok(
                QueryOutcome::GenerationStatus(self.projections.generation(aggregate_id)),
            ),
            GenerationQueryKind::GetQueuePosition { aggregate_id } => Ok(
                QueryOutcome::QueuePosition(self.projections.queue_position(aggregate_id)),
            ),
            GenerationQueryKind::GetUserGenerationHistory {
                user_id,
                page,
                page_size,
                status,
            } => Ok(QueryOutcome::UserHistory(self.projections.user_history(
                user_id,
                page,
                page_size,
                status,
            ))),
            GenerationQueryKind::GetSystemMetrics => {
                Ok(QueryOutcome::SystemMetrics(self.projections.queue_status()))
            }
            GenerationQueryKind::GetEventHistory { aggregate_id } => {
                if !self.event_history_enabled {
                    return Err(QueryError::HistoryDisabled);
                }
                let stored = self.store.load_events(aggregate_id).await.map_err(QueryError::from)?;
                Ok(QueryOutcome::EventHistory(
                    stored.iter().map(EventView::from).collect(),
                ))
            }
        }
    }
}
