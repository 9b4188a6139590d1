use thiserror::Error;

/// Errors that can occur in the messaging layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker connection could not be established.
    #[error("failed to connect to broker: {0}")]
    Connection(String),

    /// A session could not be created over the connection.
    #[error("failed to create session: {0}")]
    SessionCreation(String),

    /// The session pool has no available session. Callers see this
    /// immediately rather than waiting; backpressure is a signal here,
    /// not added latency.
    #[error("no sessions available in pool")]
    PoolExhausted,

    /// The session pool has been shut down.
    #[error("session pool is closed")]
    PoolClosed,

    /// The session is closed and cannot be used.
    #[error("session is closed")]
    SessionClosed,

    /// A publish was not accepted by the broker.
    #[error("publish failed: {0}")]
    Publish(String),

    /// A consumer could not be registered on the queue.
    #[error("failed to register consumer: {0}")]
    Consume(String),

    /// A delivery could not be acknowledged or rejected.
    #[error("failed to settle delivery: {0}")]
    Ack(String),

    /// A session or connection did not close cleanly.
    #[error("failed to close: {0}")]
    Close(String),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
