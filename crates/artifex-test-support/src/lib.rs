//! Shared test mocks and utilities for the Artifex image-generation engine.

mod clock;
mod repository;

pub use clock::FixedClock;
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};
