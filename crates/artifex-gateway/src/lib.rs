//! Artifex Gateway — the WebSocket distribution layer.
//!
//! Accepts client connections, authenticates them, routes their commands and
//! queries to the application buses, and fans committed events out to every
//! subscribed connection in real time.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod frames;
pub mod registry;
pub mod routes;
pub mod state;
