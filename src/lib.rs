//! CloudLink device-side remote configuration library.
//!
//! Exposes the RCI engine, its schema catalog, the built-in handlers and
//! the host adapters for integration testing and the replay tool.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod rci;
pub mod schema;
