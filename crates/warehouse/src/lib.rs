//! Asynchronous side of the order-fulfillment pipeline.
//!
//! A pool of consumer workers drains the durable queue with manual
//! acknowledgment and records every order in the [`OrderTracker`].

pub mod config;
pub mod tracker;
pub mod worker;

pub use config::Config;
pub use tracker::OrderTracker;
pub use worker::ConsumerWorkerPool;
