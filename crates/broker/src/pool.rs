//! Bounded pool of reusable publish sessions over one shared connection.

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use crate::session::{BrokerConnection, Session};
use crate::{BrokerError, Result};

struct PoolState {
    idle: Vec<Box<dyn Session>>,
    closed: bool,
}

struct PoolInner {
    conn: Arc<dyn BrokerConnection>,
    queue: String,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    /// Returns a session to the pool, or closes it when the pool is shut
    /// down, the session is no longer open, or the pool is at capacity.
    fn release(self: &Arc<Self>, session: Box<dyn Session>) {
        let mut state = self.state.lock().unwrap();
        if !state.closed && session.is_open() && state.idle.len() < self.capacity {
            state.idle.push(session);
            return;
        }
        drop(state);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = session.close().await {
                        tracing::warn!(%err, "failed to close surplus session");
                    }
                });
            }
            Err(_) => {
                // No runtime to run the close on; dropping the handle
                // severs the session without the close handshake.
                drop(session);
            }
        }
    }
}

/// A fixed-size pool of publish sessions.
///
/// Every session declares the target queue at creation, so a publisher can
/// assume the queue exists. Acquisition is non-blocking: an empty pool is
/// reported as [`BrokerError::PoolExhausted`] immediately.
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Builds a pool of exactly `size` sessions over `conn`, which the pool
    /// owns from here on. If any session cannot be created, the partially
    /// built state (sessions and connection) is released and the error is
    /// returned.
    pub async fn new(
        conn: Arc<dyn BrokerConnection>,
        queue: impl Into<String>,
        size: usize,
    ) -> Result<Self> {
        let inner = Arc::new(PoolInner {
            conn,
            queue: queue.into(),
            capacity: size,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(size),
                closed: false,
            }),
        });

        for n in 0..size {
            match open_session(&inner).await {
                Ok(session) => inner.state.lock().unwrap().idle.push(session),
                Err(err) => {
                    tracing::error!(%err, session = n, "pool construction failed");
                    let pool = Self { inner };
                    pool.shutdown().await;
                    return Err(err);
                }
            }
        }

        tracing::info!(size, queue = %inner.queue, "created publish session pool");
        Ok(Self { inner })
    }

    /// Takes a session out of the pool, transferring exclusive ownership to
    /// the caller until the returned guard is dropped.
    ///
    /// Never waits: an empty pool fails with `PoolExhausted` right away. A
    /// pooled session found closed is transparently replaced with a fresh
    /// one; if that fails, `SessionCreation` is returned and the slot is
    /// forfeited.
    pub async fn acquire(&self) -> Result<PooledSession> {
        let popped = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return Err(BrokerError::PoolClosed);
            }
            state.idle.pop().ok_or(BrokerError::PoolExhausted)?
        };

        let session = if popped.is_open() {
            popped
        } else {
            tracing::debug!("replacing stale pooled session");
            open_session(&self.inner).await?
        };

        Ok(PooledSession {
            session: Some(session),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Closes every pooled session and the backing connection. Idempotent;
    /// once called, `acquire` fails with `PoolClosed`.
    pub async fn shutdown(&self) {
        let drained = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        for session in drained {
            if let Err(err) = session.close().await {
                tracing::warn!(%err, "failed to close pooled session");
            }
        }
        if let Err(err) = self.inner.conn.close().await {
            tracing::warn!(%err, "failed to close pool connection");
        }
        tracing::info!("publish session pool shut down");
    }

    /// Number of sessions currently idle in the pool.
    pub fn available(&self) -> usize {
        self.inner.state.lock().unwrap().idle.len()
    }
}

async fn open_session(inner: &Arc<PoolInner>) -> Result<Box<dyn Session>> {
    let session = inner.conn.open_session().await?;
    if let Err(err) = session.declare_queue(&inner.queue).await {
        return Err(BrokerError::SessionCreation(err.to_string()));
    }
    Ok(session)
}

/// Exclusive handle on a pooled session.
///
/// Dropping the guard gives the session back on every exit path, including
/// early returns and errors; the pool then decides whether to keep or close
/// it.
pub struct PooledSession {
    session: Option<Box<dyn Session>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledSession {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        // Invariant: the session is only taken in drop.
        self.session.as_deref().expect("session present until drop")
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;

    const QUEUE: &str = "pool_orders";

    async fn pool_of(broker: &InMemoryBroker, size: usize) -> (SessionPool, crate::InMemoryConnection) {
        let conn = broker.connect();
        let pool = SessionPool::new(Arc::new(conn.clone()), QUEUE, size)
            .await
            .unwrap();
        (pool, conn)
    }

    #[tokio::test]
    async fn construction_creates_all_sessions_eagerly() {
        let broker = InMemoryBroker::new();
        let (pool, _conn) = pool_of(&broker, 4).await;
        assert_eq!(pool.available(), 4);
        // Every session declared the queue.
        assert_eq!(broker.queue_depth(QUEUE), 0);
    }

    #[tokio::test]
    async fn acquire_and_release_cycle() {
        let broker = InMemoryBroker::new();
        let (pool, _conn) = pool_of(&broker, 2).await;

        let guard = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 1);
        guard.publish(QUEUE, b"order").await.unwrap();
        drop(guard);
        assert_eq!(pool.available(), 2);
        assert_eq!(broker.queue_depth(QUEUE), 1);
    }

    #[tokio::test]
    async fn empty_pool_fails_fast() {
        let broker = InMemoryBroker::new();
        let (pool, _conn) = pool_of(&broker, 1).await;

        let _held = pool.acquire().await.unwrap();
        assert!(matches!(
            pool.acquire().await,
            Err(BrokerError::PoolExhausted)
        ));
    }

    #[tokio::test]
    async fn stale_session_is_replaced_on_acquire() {
        let broker = InMemoryBroker::new();
        let (pool, conn) = pool_of(&broker, 1).await;

        // Invalidate the idle session while it sits in the pool.
        conn.sever_sessions();

        let guard = pool.acquire().await.unwrap();
        assert!(guard.is_open());
        guard.publish(QUEUE, b"after-replacement").await.unwrap();
        assert_eq!(broker.queue_depth(QUEUE), 1);
    }

    #[tokio::test]
    async fn released_closed_session_does_not_rejoin_pool() {
        let broker = InMemoryBroker::new();
        let (pool, _conn) = pool_of(&broker, 2).await;

        let guard = pool.acquire().await.unwrap();
        guard.close().await.unwrap();
        drop(guard);

        // Only the untouched session remains.
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn guard_dropped_outside_runtime_does_not_panic() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let broker = InMemoryBroker::new();

        let guard = rt.block_on(async {
            let pool = SessionPool::new(Arc::new(broker.connect()), QUEUE, 1)
                .await
                .unwrap();
            let guard = pool.acquire().await.unwrap();
            // Shutting down forces the release path that must close the
            // surplus session rather than pool it.
            pool.shutdown().await;
            guard
        });

        drop(guard);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes_acquire() {
        let broker = InMemoryBroker::new();
        let (pool, conn) = pool_of(&broker, 2).await;

        pool.shutdown().await;
        pool.shutdown().await;

        assert!(conn.is_closed());
        assert!(matches!(pool.acquire().await, Err(BrokerError::PoolClosed)));
    }
}
