//! Artifex Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that the event store,
//! the image-generation context, and the gateway depend on. It contains no
//! infrastructure code.

pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod query;
pub mod repository;
