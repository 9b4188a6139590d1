//! Checkout orchestration.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use domain::{CartId, Order, OrderId};

use crate::cart::CartStore;
use crate::error::CheckoutError;
use crate::gateway::{AuthorizationOutcome, PaymentGateway, mask_card_number};
use crate::publisher::OrderPublisher;

/// Sequences a checkout: validate the cart, authorize the payment, allocate
/// the order ID, publish the order.
///
/// Each stage is a terminal exit on failure. The order-ID counter is the
/// only shared mutable state owned here; it increments strictly after a
/// positive authorization and is never rolled back, so a publish failure
/// leaves a gap in the ID sequence (accepted behavior).
pub struct CheckoutOrchestrator<G> {
    carts: Arc<CartStore>,
    gateway: G,
    publisher: OrderPublisher,
    next_order_id: AtomicI32,
}

impl<G: PaymentGateway> CheckoutOrchestrator<G> {
    pub fn new(carts: Arc<CartStore>, gateway: G, publisher: OrderPublisher) -> Self {
        Self {
            carts,
            gateway,
            publisher,
            next_order_id: AtomicI32::new(1),
        }
    }

    #[tracing::instrument(skip(self, card_number), fields(%cart_id))]
    pub async fn checkout(
        &self,
        cart_id: CartId,
        card_number: &str,
    ) -> Result<OrderId, CheckoutError> {
        metrics::counter!("checkouts_total").increment(1);

        if card_number.trim().is_empty() {
            return Err(CheckoutError::InvalidInput(
                "credit card number is required".to_string(),
            ));
        }

        // Validating
        let cart = self
            .carts
            .get(cart_id)
            .ok_or(CheckoutError::CartNotFound(cart_id))?;
        if cart.items.is_empty() {
            return Err(CheckoutError::EmptyCart(cart_id));
        }

        // Authorizing
        tracing::info!(card = %mask_card_number(card_number), "authorizing credit card");
        match self.gateway.authorize(card_number).await? {
            AuthorizationOutcome::Authorized => {}
            AuthorizationOutcome::Declined => {
                metrics::counter!("checkouts_declined_total").increment(1);
                return Err(CheckoutError::PaymentDeclined);
            }
        }

        // Allocating: must happen strictly after authorization succeeded.
        let order_id = OrderId::new(self.next_order_id.fetch_add(1, Ordering::SeqCst));

        // Publishing
        let order = Order {
            order_id,
            shopping_cart_id: cart.shopping_cart_id,
            customer_id: cart.customer_id,
            items: cart.items,
        };
        self.publisher.publish(&order).await?;

        tracing::info!(%order_id, "checkout completed");
        Ok(order_id)
    }
}
