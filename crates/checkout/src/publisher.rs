//! Durable order publisher.

use std::sync::Arc;
use std::time::Duration;

use broker::SessionPool;
use domain::Order;

use crate::error::PublishError;

/// Upper bound on how long a publish may wait for broker acceptance.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes orders to the warehouse queue through the session pool.
///
/// No client-side retry: a failed publish is reported to the caller as a
/// hard failure, and redelivery policy stays with the caller.
pub struct OrderPublisher {
    pool: Arc<SessionPool>,
    queue: String,
}

impl OrderPublisher {
    pub fn new(pool: Arc<SessionPool>, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
        }
    }

    /// Serializes `order` and publishes it with persistent delivery,
    /// returning only once the broker has accepted the message for durable
    /// storage or the deadline elapsed.
    ///
    /// The pooled session is released on every exit path, including errors
    /// and the timeout.
    pub async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let session = self.pool.acquire().await.map_err(PublishError::Broker)?;
        let body = serde_json::to_vec(order)?;

        match tokio::time::timeout(PUBLISH_TIMEOUT, session.publish(&self.queue, &body)).await {
            Ok(Ok(())) => {
                metrics::counter!("orders_published_total").increment(1);
                tracing::info!(order_id = %order.order_id, queue = %self.queue, "published order");
                Ok(())
            }
            Ok(Err(err)) => Err(PublishError::Broker(err)),
            Err(_elapsed) => Err(PublishError::Timeout),
        }
    }
}
