//! Shared types for the order-fulfillment pipeline.
//!
//! These types define the wire contract between the checkout service and
//! the warehouse consumer, so both sides depend on this crate rather than
//! redefining the message shape.

pub mod ids;
pub mod order;

pub use ids::{CartId, CustomerId, OrderId, ProductId};
pub use order::{CartItem, Order};
