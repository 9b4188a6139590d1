//! Order message types published to the warehouse queue.

use serde::{Deserialize, Serialize};

use crate::ids::{CartId, CustomerId, OrderId, ProductId};

/// A single product line in a cart or order.
///
/// Quantity is always positive; the cart store rejects non-positive
/// quantities before an item ever reaches an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl CartItem {
    pub fn new(product_id: ProductId, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// An order handed to the warehouse.
///
/// Created by the orchestrator only after a positive authorization outcome
/// and serialized as-is onto the wire:
/// `{"order_id": …, "shopping_cart_id": …, "customer_id": …, "items": […]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub shopping_cart_id: CartId,
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            order_id: OrderId::new(7),
            shopping_cart_id: CartId::new(3),
            customer_id: CustomerId::new(42),
            items: vec![
                CartItem::new(ProductId::new(1001), 5),
                CartItem::new(ProductId::new(1002), 3),
            ],
        }
    }

    #[test]
    fn order_wire_format_matches_contract() {
        let json = serde_json::to_value(sample_order()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "order_id": 7,
                "shopping_cart_id": 3,
                "customer_id": 42,
                "items": [
                    {"product_id": 1001, "quantity": 5},
                    {"product_id": 1002, "quantity": 3},
                ],
            })
        );
    }

    #[test]
    fn order_deserializes_field_identical() {
        let order = sample_order();
        let bytes = serde_json::to_vec(&order).unwrap();
        let back: Order = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn malformed_body_is_rejected() {
        let result = serde_json::from_slice::<Order>(b"{\"order_id\": \"oops\"}");
        assert!(result.is_err());
    }
}
