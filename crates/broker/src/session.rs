use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::Result;

/// A stream of deliveries handed to a registered consumer.
///
/// The stream ends when the session or the underlying connection is closed.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Box<dyn Delivery>> + Send>>;

/// One shared broker connection over which sessions are multiplexed.
///
/// Closing the connection is the only cancellation primitive in the
/// pipeline: it terminates every consumer's delivery stream and fails any
/// in-flight publish.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Opens a new logical session over this connection.
    async fn open_session(&self) -> Result<Box<dyn Session>>;

    /// Closes the connection and every session on it. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Returns true once the connection has been closed.
    fn is_closed(&self) -> bool;
}

/// A logical channel over the shared connection.
///
/// A session is owned by exactly one holder at a time; it is never used
/// concurrently from two tasks.
#[async_trait]
pub trait Session: Send + Sync {
    /// Declares `queue` as durable, non-exclusive and not auto-deleted.
    /// Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Publishes `payload` to `queue` with persistent delivery mode and
    /// `application/json` content type, returning only once the broker has
    /// accepted the message for durable storage.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// Caps the number of unacknowledged deliveries this session's
    /// consumers may hold at once.
    async fn set_prefetch(&self, count: u16) -> Result<()>;

    /// Registers a consumer on `queue` with manual acknowledgment and
    /// returns its delivery stream.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Returns true while the session is usable.
    fn is_open(&self) -> bool;

    /// Closes the session.
    async fn close(&self) -> Result<()>;
}

/// A single message handed to a consumer, awaiting manual settlement.
#[async_trait]
pub trait Delivery: Send {
    /// The raw message body.
    fn body(&self) -> &[u8];

    /// Positively acknowledges the delivery.
    async fn ack(self: Box<Self>) -> Result<()>;

    /// Negatively acknowledges the delivery without requeueing it. Used
    /// for poison messages that must not re-enter the queue.
    async fn reject(self: Box<Self>) -> Result<()>;
}
