//! Messaging layer for the order-fulfillment pipeline.
//!
//! The [`BrokerConnection`]/[`Session`] traits abstract one shared broker
//! connection carrying multiple logical sessions. Two implementations are
//! provided: [`amqp`] backed by a real AMQP 0-9-1 broker via lapin, and
//! [`memory`] for tests. [`pool::SessionPool`] bounds concurrent publish
//! fan-out to a fixed set of reusable sessions.

pub mod amqp;
pub mod error;
pub mod memory;
pub mod pool;
pub mod session;

pub use amqp::AmqpConnection;
pub use error::{BrokerError, Result};
pub use memory::{InMemoryBroker, InMemoryConnection};
pub use pool::{PooledSession, SessionPool};
pub use session::{BrokerConnection, Delivery, DeliveryStream, Session};
