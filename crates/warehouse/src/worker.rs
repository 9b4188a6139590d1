//! Consumer worker pool with manual acknowledgment.

use std::sync::Arc;

use broker::{BrokerConnection, Delivery, DeliveryStream, Result, Session};
use domain::Order;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::tracker::OrderTracker;

/// A fixed set of independent consumer workers sharing one connection.
///
/// Each worker owns its session with a prefetch limit of one, so deliveries
/// distribute round-robin across workers and per-worker in-flight memory is
/// bounded to a single message.
pub struct ConsumerWorkerPool {
    conn: Arc<dyn BrokerConnection>,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerWorkerPool {
    /// Opens one session per worker, registers the consumers and starts the
    /// worker tasks. If any worker fails to start, the workers already
    /// running are torn down before the error is returned.
    pub async fn start(
        conn: Arc<dyn BrokerConnection>,
        queue: &str,
        num_workers: usize,
        tracker: Arc<OrderTracker>,
    ) -> Result<Self> {
        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 1..=num_workers {
            match open_worker_session(conn.as_ref(), queue, worker_id).await {
                Ok((session, stream)) => {
                    let tracker = Arc::clone(&tracker);
                    handles.push(tokio::spawn(run_worker(worker_id, session, stream, tracker)));
                }
                Err(err) => {
                    tracing::error!(worker_id, %err, "failed to start consumer worker");
                    if let Err(close_err) = conn.close().await {
                        tracing::warn!(%close_err, "failed to close connection during teardown");
                    }
                    for handle in handles {
                        if let Err(join_err) = handle.await {
                            tracing::error!(%join_err, "worker task failed during teardown");
                        }
                    }
                    return Err(err);
                }
            }
        }
        tracing::info!(num_workers, queue, "consumer workers started");
        Ok(Self { conn, handles })
    }

    /// Stops the pool: closes the shared connection, which ends every
    /// worker's delivery stream, then waits for each worker to finish the
    /// message it has in hand and exit. After this returns it is safe to
    /// read final tracker state.
    pub async fn stop(self) {
        if let Err(err) = self.conn.close().await {
            tracing::warn!(%err, "failed to close consumer connection");
        }
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(%err, "worker task failed");
            }
        }
        tracing::info!("all consumer workers stopped");
    }
}

async fn open_worker_session(
    conn: &dyn BrokerConnection,
    queue: &str,
    worker_id: usize,
) -> Result<(Box<dyn Session>, DeliveryStream)> {
    let session = conn.open_session().await?;
    session.declare_queue(queue).await?;
    session.set_prefetch(1).await?;
    let stream = session
        .consume(queue, &format!("worker-{worker_id}"))
        .await?;
    Ok((session, stream))
}

async fn run_worker(
    worker_id: usize,
    session: Box<dyn Session>,
    mut stream: DeliveryStream,
    tracker: Arc<OrderTracker>,
) {
    tracing::info!(worker_id, "worker waiting for deliveries");
    while let Some(delivery) = stream.next().await {
        handle_delivery(worker_id, delivery, &tracker).await;
    }
    if let Err(err) = session.close().await {
        tracing::debug!(worker_id, %err, "session close on worker exit");
    }
    tracing::info!(worker_id, "worker stopped");
}

async fn handle_delivery(worker_id: usize, delivery: Box<dyn Delivery>, tracker: &OrderTracker) {
    let order: Order = match serde_json::from_slice(delivery.body()) {
        Ok(order) => order,
        Err(err) => {
            // Poison message: discard without requeue so it cannot loop.
            tracing::warn!(worker_id, %err, "rejecting malformed order message");
            metrics::counter!("poison_messages_total").increment(1);
            if let Err(err) = delivery.reject().await {
                tracing::warn!(worker_id, %err, "failed to reject delivery");
            }
            return;
        }
    };

    let order_id = order.order_id;
    tracker.record_order(order_id, &order.items);
    metrics::counter!("orders_consumed_total").increment(1);

    // An ack failure may lead to broker-driven redelivery; duplicate counts
    // are accepted over deduplication.
    if let Err(err) = delivery.ack().await {
        tracing::warn!(worker_id, %order_id, %err, "failed to acknowledge delivery");
    } else {
        tracing::debug!(worker_id, %order_id, "order recorded and acknowledged");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use broker::{BrokerError, InMemoryBroker, InMemoryConnection};
    use domain::{CartId, CartItem, CustomerId, OrderId, ProductId};

    use super::*;

    const QUEUE: &str = "warehouse_orders";

    fn order(id: i32, product: i32, quantity: i32) -> Vec<u8> {
        serde_json::to_vec(&Order {
            order_id: OrderId::new(id),
            shopping_cart_id: CartId::new(1),
            customer_id: CustomerId::new(42),
            items: vec![CartItem::new(ProductId::new(product), quantity)],
        })
        .unwrap()
    }

    async fn publish_raw(broker: &InMemoryBroker, bodies: &[Vec<u8>]) {
        let conn = broker.connect();
        let session = conn.open_session().await.unwrap();
        session.declare_queue(QUEUE).await.unwrap();
        for body in bodies {
            session.publish(QUEUE, body).await.unwrap();
        }
        conn.close().await.unwrap();
    }

    async fn wait_for_total(tracker: &OrderTracker, expected: i64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while tracker.total_orders() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tracker never reached expected total");
    }

    #[tokio::test]
    async fn workers_drain_queue_into_tracker() {
        let broker = InMemoryBroker::new();
        publish_raw(&broker, &[order(1, 1001, 5), order(2, 1002, 3), order(3, 1001, 2)]).await;

        let tracker = Arc::new(OrderTracker::new());
        let pool = ConsumerWorkerPool::start(
            Arc::new(broker.connect()),
            QUEUE,
            2,
            tracker.clone(),
        )
        .await
        .unwrap();

        wait_for_total(&tracker, 3).await;
        pool.stop().await;

        assert_eq!(tracker.total_orders(), 3);
        assert_eq!(tracker.product_quantity(ProductId::new(1001)), 7);
        assert_eq!(tracker.product_quantity(ProductId::new(1002)), 3);
        assert_eq!(broker.queue_depth(QUEUE), 0);
    }

    #[tokio::test]
    async fn malformed_message_is_discarded_without_requeue() {
        let broker = InMemoryBroker::new();
        publish_raw(&broker, &[b"not json at all".to_vec(), order(1, 1001, 5)]).await;

        let tracker = Arc::new(OrderTracker::new());
        let pool = ConsumerWorkerPool::start(
            Arc::new(broker.connect()),
            QUEUE,
            1,
            tracker.clone(),
        )
        .await
        .unwrap();

        // The valid order behind the poison message still gets through.
        wait_for_total(&tracker, 1).await;
        pool.stop().await;

        assert_eq!(tracker.total_orders(), 1);
        assert_eq!(broker.queue_depth(QUEUE), 0);
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_deliveries() {
        let broker = InMemoryBroker::new();
        let bodies: Vec<_> = (1..=10).map(|i| order(i, 1001, 1)).collect();
        publish_raw(&broker, &bodies).await;

        let tracker = Arc::new(OrderTracker::new());
        let pool = ConsumerWorkerPool::start(
            Arc::new(broker.connect()),
            QUEUE,
            3,
            tracker.clone(),
        )
        .await
        .unwrap();

        // Stop while deliveries are (possibly) still in workers' hands.
        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.stop().await;

        // Nothing is lost and nothing is double-counted: everything handed
        // to a worker was fully handled, the rest stayed queued.
        let handled = tracker.total_orders();
        let queued = broker.queue_depth(QUEUE) as i64;
        assert_eq!(handled + queued, 10);
    }

    /// Session that accepts every operation; used where a worker only needs
    /// something to close on exit.
    struct NoopSession;

    #[async_trait]
    impl Session for NoopSession {
        async fn declare_queue(&self, _queue: &str) -> broker::Result<()> {
            Ok(())
        }

        async fn publish(&self, _queue: &str, _payload: &[u8]) -> broker::Result<()> {
            Ok(())
        }

        async fn set_prefetch(&self, _count: u16) -> broker::Result<()> {
            Ok(())
        }

        async fn consume(&self, _queue: &str, _tag: &str) -> broker::Result<DeliveryStream> {
            Ok(Box::pin(futures_util::stream::empty::<Box<dyn Delivery>>()))
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn close(&self) -> broker::Result<()> {
            Ok(())
        }
    }

    struct StubDelivery {
        body: Vec<u8>,
        ack_fails: bool,
    }

    #[async_trait]
    impl Delivery for StubDelivery {
        fn body(&self) -> &[u8] {
            &self.body
        }

        async fn ack(self: Box<Self>) -> broker::Result<()> {
            if self.ack_fails {
                Err(BrokerError::Ack("channel gone".to_string()))
            } else {
                Ok(())
            }
        }

        async fn reject(self: Box<Self>) -> broker::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn ack_failure_is_logged_and_worker_continues() {
        let tracker = Arc::new(OrderTracker::new());
        let deliveries: Vec<Box<dyn Delivery>> = vec![
            Box::new(StubDelivery {
                body: order(1, 1001, 2),
                ack_fails: true,
            }),
            Box::new(StubDelivery {
                body: order(2, 1002, 3),
                ack_fails: false,
            }),
        ];
        let stream: DeliveryStream = Box::pin(futures_util::stream::iter(deliveries));

        run_worker(1, Box::new(NoopSession), stream, tracker.clone()).await;

        // The order behind the failed ack was recorded anyway, and the
        // worker went on to the next delivery instead of dying.
        assert_eq!(tracker.total_orders(), 2);
        assert_eq!(tracker.product_quantity(ProductId::new(1001)), 2);
        assert_eq!(tracker.product_quantity(ProductId::new(1002)), 3);
    }

    /// Connection that refuses to open more than one session, to exercise
    /// the partial-startup teardown path.
    struct SessionBudgetConnection {
        inner: InMemoryConnection,
        opened: AtomicUsize,
    }

    #[async_trait]
    impl BrokerConnection for SessionBudgetConnection {
        async fn open_session(&self) -> broker::Result<Box<dyn Session>> {
            if self.opened.fetch_add(1, Ordering::SeqCst) >= 1 {
                return Err(BrokerError::SessionCreation(
                    "session budget exceeded".to_string(),
                ));
            }
            self.inner.open_session().await
        }

        async fn close(&self) -> broker::Result<()> {
            self.inner.close().await
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }
    }

    #[tokio::test]
    async fn failed_startup_tears_down_already_running_workers() {
        let broker = InMemoryBroker::new();
        let inner = broker.connect();
        let conn = Arc::new(SessionBudgetConnection {
            inner: inner.clone(),
            opened: AtomicUsize::new(0),
        });

        let tracker = Arc::new(OrderTracker::new());
        let result = ConsumerWorkerPool::start(conn, QUEUE, 2, tracker).await;

        assert!(result.is_err());
        // The first worker's connection was closed, so no task is left
        // running against the queue.
        assert!(inner.is_closed());
    }

    #[tokio::test]
    async fn workers_share_the_load() {
        let broker = InMemoryBroker::new();
        let bodies: Vec<_> = (1..=6).map(|i| order(i, 1001, 1)).collect();

        let tracker = Arc::new(OrderTracker::new());
        let pool = ConsumerWorkerPool::start(
            Arc::new(broker.connect()),
            QUEUE,
            3,
            tracker.clone(),
        )
        .await
        .unwrap();

        publish_raw(&broker, &bodies).await;
        wait_for_total(&tracker, 6).await;
        pool.stop().await;

        assert_eq!(tracker.total_orders(), 6);
        assert_eq!(tracker.product_quantity(ProductId::new(1001)), 6);
    }
}
