//! Read-side projections for the Image Generation context.
//!
//! Projections are denormalized views folded from committed events, one per
//! aggregate plus one global queue-status view. They are mutated only by the
//! event notifier, never directly by clients.

pub mod image_generation;
pub mod queue_status;
pub mod store;

pub use image_generation::ImageGenerationProjection;
pub use queue_status::{QueueStatusProjection, QueueStatusState};
pub use store::{ProjectionStore, UserHistoryPage};
