//! Synchronous side of the order-fulfillment pipeline.
//!
//! The [`CheckoutOrchestrator`] sequences cart validation, remote payment
//! authorization, order-ID allocation and the durable publish that hands an
//! order to the warehouse.

pub mod cart;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod publisher;

pub use cart::{CartStore, ShoppingCart};
pub use error::{CheckoutError, PublishError};
pub use gateway::{AuthorizationOutcome, HttpPaymentGateway, PaymentGateway, StaticPaymentGateway};
pub use orchestrator::CheckoutOrchestrator;
pub use publisher::OrderPublisher;
