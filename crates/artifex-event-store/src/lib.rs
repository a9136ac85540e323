//! Artifex Event Store — the append-only source of truth.
//!
//! Two [`artifex_core::repository::EventRepository`] backends (in-memory and
//! PostgreSQL) plus the [`store::EventStore`] façade that serializes appends
//! per aggregate and notifies commit subscribers synchronously.

pub mod memory_event_repository;
pub mod pg_event_repository;
pub mod schema;
pub mod store;

pub use memory_event_repository::InMemoryEventRepository;
pub use pg_event_repository::PgEventRepository;
pub use store::{EventStore, SubscriptionId};
