//! Domain model for the Image Generation context.

pub mod aggregates;
pub mod commands;
pub mod events;
