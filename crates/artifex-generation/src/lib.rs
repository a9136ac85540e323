//! Artifex — Image Generation bounded context.
//!
//! The event-sourced lifecycle of an image-generation job: domain events and
//! the aggregate state machine, the command and query buses, the read-side
//! projections, and the notifier that keeps projections and real-time
//! subscribers in sync with every commit.

pub mod application;
pub mod domain;
pub mod notifier;
pub mod projections;
