//! # Builders
//!
//! Fluent construction of a [`WorkerDispatcher`](crate::dispatcher::WorkerDispatcher).
//!
//! ## Modules
//!
//! - [`dispatcher_builder`] - queue, spawner and key wiring for one batch

pub mod dispatcher_builder;

pub use dispatcher_builder::DispatcherBuilder;
