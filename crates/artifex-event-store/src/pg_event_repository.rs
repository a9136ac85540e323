//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use artifex_core::error::DomainError;
use artifex_core::repository::{EventRepository, StoredEvent};

use crate::schema;

const SELECT_COLUMNS: &str = "SELECT event_id, aggregate_id, event_type, payload, \
     sequence_number, correlation_id, causation_id, user_id, occurred_at \
     FROM domain_events";

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the events table schema. Idempotent; run at startup.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(schema::CREATE_EVENTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

fn row_to_stored(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        sequence_number: row.try_get("sequence_number")?,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        user_id: row.try_get("user_id")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

/// True when the error is a violation of the `(aggregate_id,
/// sequence_number)` unique constraint — a concurrent append won the race
/// between our version check and our insert.
fn is_stream_version_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.constraint() == Some("domain_events_stream_version")
    )
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE aggregate_id = $1 ORDER BY sequence_number"
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;

        rows.iter()
            .map(|row| row_to_stored(row).map_err(infrastructure))
            .collect()
    }

    async fn load_events_from(
        &self,
        aggregate_id: Uuid,
        after_sequence: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE aggregate_id = $1 AND sequence_number > $2 \
             ORDER BY sequence_number"
        ))
        .bind(aggregate_id)
        .bind(after_sequence)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;

        rows.iter()
            .map(|row| row_to_stored(row).map_err(infrastructure))
            .collect()
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        // Lock the stream head so concurrent appends on the same aggregate
        // serialize here; appends on other aggregates are unaffected.
        let head: Option<i64> = sqlx::query_scalar(
            "SELECT sequence_number FROM domain_events \
             WHERE aggregate_id = $1 \
             ORDER BY sequence_number DESC LIMIT 1 FOR UPDATE",
        )
        .bind(aggregate_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(infrastructure)?;

        let actual = head.unwrap_or(0);
        if expected_version != actual {
            return Err(DomainError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let insert = sqlx::query(
                "INSERT INTO domain_events \
                 (event_id, aggregate_id, event_type, payload, sequence_number, \
                  correlation_id, causation_id, user_id, occurred_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(event.event_id)
            .bind(event.aggregate_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.sequence_number)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(event.user_id)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await;

            if let Err(err) = insert {
                // The unique constraint backstops the race where two
                // transactions both saw an empty stream (nothing to lock).
                if is_stream_version_violation(&err) {
                    // The failed transaction cannot run further queries;
                    // read the real head outside it so the caller's re-read
                    // starts from the right version.
                    drop(tx);
                    let actual = self.aggregate_version(aggregate_id).await?;
                    return Err(DomainError::VersionConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(infrastructure(err));
            }
        }

        tx.commit().await.map_err(infrastructure)?;
        Ok(())
    }

    async fn aggregate_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let version: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM domain_events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(version)
    }
}
