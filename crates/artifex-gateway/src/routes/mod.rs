//! HTTP route definitions.

pub mod health;
pub mod ws;
