//! Checkout error taxonomy.

use broker::BrokerError;
use domain::CartId;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::publisher::PUBLISH_TIMEOUT;

/// Errors on the publish path. All of them surface to the checkout caller
/// as a failed checkout; none of them leave a partial message visible to
/// consumers.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The order could not be serialized to the wire format.
    #[error("failed to serialize order: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A pool or session fault, including `PoolExhausted` propagated from
    /// acquire.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The broker did not accept the message within the deadline.
    #[error("publish not confirmed within {:?}", PUBLISH_TIMEOUT)]
    Timeout,
}

/// Errors returned from a checkout attempt.
///
/// Validation and gateway failures happen before any side effect; a publish
/// failure happens after the order ID was allocated, leaving an accepted
/// gap in the ID sequence.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("shopping cart {0} not found")]
    CartNotFound(CartId),

    #[error("cannot check out empty shopping cart {0}")]
    EmptyCart(CartId),

    /// The gateway could not produce a decision (unreachable, malformed
    /// input). Distinct from a decline.
    #[error("failed to authorize credit card: {0}")]
    Authorization(#[from] GatewayError),

    /// The gateway returned a structured "Declined" outcome. Terminal, no
    /// retry.
    #[error("credit card payment was declined")]
    PaymentDeclined,

    #[error("failed to hand order to the warehouse: {0}")]
    Publish(#[from] PublishError),
}
