//! In-memory broker implementation for testing.
//!
//! Provides the same interface as the AMQP implementation: durable queues,
//! round-robin dispatch across consumers, one unacknowledged delivery per
//! consumer at a time, and manual acknowledgment.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::session::{BrokerConnection, Delivery, DeliveryStream, Session};
use crate::{BrokerError, Result};

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Vec<u8>>,
    consumers: Vec<ConsumerSlot>,
    cursor: usize,
}

struct ConsumerSlot {
    slot_id: u64,
    conn_id: u64,
    busy: bool,
    tx: mpsc::UnboundedSender<InMemoryDelivery>,
}

struct Core {
    state: Mutex<BrokerState>,
    next_id: AtomicU64,
}

impl Core {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Hands ready messages to idle consumers, round-robin. Must be called
/// with the state lock held; sends are synchronous (unbounded channel)
/// so the lock is never held across an await.
fn dispatch(core: &Arc<Core>, queue_name: &str, state: &mut BrokerState) {
    let Some(q) = state.queues.get_mut(queue_name) else {
        return;
    };
    q.consumers.retain(|c| !c.tx.is_closed());
    loop {
        if q.ready.is_empty() || q.consumers.is_empty() {
            if q.consumers.is_empty() {
                q.cursor = 0;
            }
            return;
        }
        let n = q.consumers.len();
        let Some(offset) = (0..n).find(|o| !q.consumers[(q.cursor + o) % n].busy) else {
            // Every consumer holds an unacknowledged delivery.
            return;
        };
        let idx = (q.cursor + offset) % n;
        let Some(body) = q.ready.pop_front() else {
            return;
        };
        let slot = &mut q.consumers[idx];
        let delivery = InMemoryDelivery {
            core: Arc::clone(core),
            queue: queue_name.to_string(),
            slot_id: slot.slot_id,
            body,
        };
        match slot.tx.send(delivery) {
            Ok(()) => {
                slot.busy = true;
                q.cursor = (idx + 1) % n;
            }
            Err(err) => {
                // Consumer vanished between the retain above and the
                // send; put the message back and drop the slot.
                q.ready.push_front(err.0.body);
                let dead = q.consumers[idx].slot_id;
                q.consumers.retain(|c| c.slot_id != dead);
                if !q.consumers.is_empty() {
                    q.cursor %= q.consumers.len();
                } else {
                    q.cursor = 0;
                }
            }
        }
    }
}

/// Marks a consumer idle again after an acknowledgment and hands it the
/// next ready message, if any.
fn settle(core: &Arc<Core>, queue: &str, slot_id: u64) {
    let mut state = core.state.lock().unwrap();
    if let Some(q) = state.queues.get_mut(queue)
        && let Some(slot) = q.consumers.iter_mut().find(|c| c.slot_id == slot_id)
    {
        slot.busy = false;
    }
    dispatch(core, queue, &mut state);
}

/// An in-memory broker. Queues survive connection close, mirroring a
/// durable queue whose definition outlives its clients.
#[derive(Clone)]
pub struct InMemoryBroker {
    core: Arc<Core>,
}

impl InMemoryBroker {
    /// Creates a new broker with no queues.
    pub fn new() -> Self {
        Self {
            core: Arc::new(Core {
                state: Mutex::new(BrokerState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a connection to this broker.
    pub fn connect(&self) -> InMemoryConnection {
        InMemoryConnection {
            core: Arc::clone(&self.core),
            conn_id: self.core.next_id(),
            closed: Arc::new(AtomicBool::new(false)),
            session_flags: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the number of messages waiting in `queue` (not yet handed
    /// to any consumer).
    pub fn queue_depth(&self, queue: &str) -> usize {
        let state = self.core.state.lock().unwrap();
        state.queues.get(queue).map_or(0, |q| q.ready.len())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection handle onto an [`InMemoryBroker`].
#[derive(Clone)]
pub struct InMemoryConnection {
    core: Arc<Core>,
    conn_id: u64,
    closed: Arc<AtomicBool>,
    session_flags: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl InMemoryConnection {
    /// Marks every session opened on this connection closed without
    /// closing the connection itself. Lets tests exercise the stale-session
    /// replacement path in the pool.
    pub fn sever_sessions(&self) {
        for flag in self.session_flags.lock().unwrap().iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    async fn open_session(&self) -> Result<Box<dyn Session>> {
        if self.is_closed() {
            return Err(BrokerError::SessionCreation(
                "connection is closed".to_string(),
            ));
        }
        let open = Arc::new(AtomicBool::new(true));
        self.session_flags.lock().unwrap().push(Arc::clone(&open));
        Ok(Box::new(InMemorySession {
            core: Arc::clone(&self.core),
            conn_id: self.conn_id,
            open,
            conn_closed: Arc::clone(&self.closed),
            consumer_slots: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for flag in self.session_flags.lock().unwrap().iter() {
            flag.store(false, Ordering::SeqCst);
        }
        // Dropping the consumer senders ends every delivery stream opened
        // through this connection; ready messages stay in their queues.
        let mut state = self.core.state.lock().unwrap();
        for q in state.queues.values_mut() {
            q.consumers.retain(|c| c.conn_id != self.conn_id);
            if q.consumers.is_empty() {
                q.cursor = 0;
            } else {
                q.cursor %= q.consumers.len();
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct InMemorySession {
    core: Arc<Core>,
    conn_id: u64,
    open: Arc<AtomicBool>,
    conn_closed: Arc<AtomicBool>,
    consumer_slots: Mutex<Vec<u64>>,
}

#[async_trait]
impl Session for InMemorySession {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        if !self.is_open() {
            return Err(BrokerError::SessionClosed);
        }
        let mut state = self.core.state.lock().unwrap();
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(BrokerError::SessionClosed);
        }
        let mut state = self.core.state.lock().unwrap();
        let Some(q) = state.queues.get_mut(queue) else {
            return Err(BrokerError::Publish(format!("queue {queue} not declared")));
        };
        q.ready.push_back(payload.to_vec());
        dispatch(&self.core, queue, &mut state);
        Ok(())
    }

    async fn set_prefetch(&self, _count: u16) -> Result<()> {
        // Dispatch already caps each consumer at one unacknowledged
        // delivery, matching the prefetch the workers request.
        if !self.is_open() {
            return Err(BrokerError::SessionClosed);
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        if !self.is_open() {
            return Err(BrokerError::Consume("session is closed".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let slot_id = self.core.next_id();
        {
            let mut state = self.core.state.lock().unwrap();
            let q = state.queues.entry(queue.to_string()).or_default();
            q.consumers.push(ConsumerSlot {
                slot_id,
                conn_id: self.conn_id,
                busy: false,
                tx,
            });
            dispatch(&self.core, queue, &mut state);
        }
        self.consumer_slots.lock().unwrap().push(slot_id);
        tracing::debug!(consumer_tag, queue, "registered in-memory consumer");

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|d| (Box::new(d) as Box<dyn Delivery>, rx))
        });
        Ok(Box::pin(stream))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.conn_closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        let slots = std::mem::take(&mut *self.consumer_slots.lock().unwrap());
        if !slots.is_empty() {
            let mut state = self.core.state.lock().unwrap();
            for q in state.queues.values_mut() {
                q.consumers.retain(|c| !slots.contains(&c.slot_id));
                if q.consumers.is_empty() {
                    q.cursor = 0;
                } else {
                    q.cursor %= q.consumers.len();
                }
            }
        }
        Ok(())
    }
}

struct InMemoryDelivery {
    core: Arc<Core>,
    queue: String,
    slot_id: u64,
    body: Vec<u8>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(self: Box<Self>) -> Result<()> {
        settle(&self.core, &self.queue, self.slot_id);
        Ok(())
    }

    async fn reject(self: Box<Self>) -> Result<()> {
        // Discarded, never requeued.
        settle(&self.core, &self.queue, self.slot_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio::time::timeout;

    use super::*;

    const QUEUE: &str = "test_orders";

    async fn session(conn: &InMemoryConnection) -> Box<dyn Session> {
        let s = conn.open_session().await.unwrap();
        s.declare_queue(QUEUE).await.unwrap();
        s
    }

    #[tokio::test]
    async fn publish_then_consume_delivers_body() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect();
        let s = session(&conn).await;

        let mut stream = s.consume(QUEUE, "c-1").await.unwrap();
        s.publish(QUEUE, b"hello").await.unwrap();

        let delivery = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.body(), b"hello");
        delivery.ack().await.unwrap();
        assert_eq!(broker.queue_depth(QUEUE), 0);
    }

    #[tokio::test]
    async fn second_delivery_waits_for_ack() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect();
        let s = session(&conn).await;

        let mut stream = s.consume(QUEUE, "c-1").await.unwrap();
        s.publish(QUEUE, b"first").await.unwrap();
        s.publish(QUEUE, b"second").await.unwrap();

        let first = stream.next().await.unwrap();
        assert_eq!(first.body(), b"first");

        // Unacknowledged: the second message must not be handed over yet.
        assert!(
            timeout(Duration::from_millis(50), stream.next())
                .await
                .is_err()
        );
        assert_eq!(broker.queue_depth(QUEUE), 1);

        first.ack().await.unwrap();
        let second = timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.body(), b"second");
    }

    #[tokio::test]
    async fn deliveries_round_robin_across_consumers() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect();
        let s1 = session(&conn).await;
        let s2 = session(&conn).await;

        let mut stream1 = s1.consume(QUEUE, "c-1").await.unwrap();
        let mut stream2 = s2.consume(QUEUE, "c-2").await.unwrap();

        s1.publish(QUEUE, b"a").await.unwrap();
        s1.publish(QUEUE, b"b").await.unwrap();

        let d1 = timeout(Duration::from_secs(1), stream1.next())
            .await
            .unwrap()
            .unwrap();
        let d2 = timeout(Duration::from_secs(1), stream2.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d1.body(), b"a");
        assert_eq!(d2.body(), b"b");
    }

    #[tokio::test]
    async fn closing_connection_ends_delivery_stream() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect();
        let s = session(&conn).await;
        let mut stream = s.consume(QUEUE, "c-1").await.unwrap();

        conn.close().await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn queue_keeps_messages_without_consumers() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect();
        let s = session(&conn).await;

        for body in [b"1", b"2", b"3"] {
            s.publish(QUEUE, body).await.unwrap();
        }
        assert_eq!(broker.queue_depth(QUEUE), 3);

        // Queue definition and contents survive the publisher going away.
        conn.close().await.unwrap();
        assert_eq!(broker.queue_depth(QUEUE), 3);
    }

    #[tokio::test]
    async fn publish_on_closed_session_fails() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect();
        let s = session(&conn).await;

        s.close().await.unwrap();
        assert!(!s.is_open());
        assert!(matches!(
            s.publish(QUEUE, b"x").await,
            Err(BrokerError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn severed_sessions_report_closed() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect();
        let s = session(&conn).await;

        assert!(s.is_open());
        conn.sever_sessions();
        assert!(!s.is_open());
        assert!(!conn.is_closed());
    }
}
