//! Shopping cart registry.
//!
//! An explicit owned store injected into the orchestrator and the HTTP
//! handlers; nothing here is process-global.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

use domain::{CartId, CartItem, CustomerId, ProductId};

use crate::error::CheckoutError;

/// A customer's shopping cart.
#[derive(Debug, Clone, Serialize)]
pub struct ShoppingCart {
    pub shopping_cart_id: CartId,
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
}

#[derive(Default)]
struct CartStoreState {
    carts: HashMap<CartId, ShoppingCart>,
    next_cart_id: i32,
}

/// In-memory keyed registry of shopping carts.
#[derive(Default)]
pub struct CartStore {
    state: RwLock<CartStoreState>,
}

impl CartStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CartStoreState {
                carts: HashMap::new(),
                next_cart_id: 1,
            }),
        }
    }

    /// Creates an empty cart for `customer_id` and returns its ID.
    pub fn create_cart(&self, customer_id: CustomerId) -> CartId {
        let mut state = self.state.write().unwrap();
        let cart_id = CartId::new(state.next_cart_id);
        state.next_cart_id += 1;
        state.carts.insert(
            cart_id,
            ShoppingCart {
                shopping_cart_id: cart_id,
                customer_id,
                items: Vec::new(),
            },
        );
        tracing::info!(%cart_id, %customer_id, "created shopping cart");
        cart_id
    }

    /// Adds `quantity` of `product_id` to the cart, merging with an
    /// existing line for the same product.
    pub fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), CheckoutError> {
        if quantity <= 0 {
            return Err(CheckoutError::InvalidInput(
                "quantity must be a positive integer".to_string(),
            ));
        }
        let mut state = self.state.write().unwrap();
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or(CheckoutError::CartNotFound(cart_id))?;
        if let Some(line) = cart.items.iter_mut().find(|i| i.product_id == product_id) {
            line.quantity += quantity;
        } else {
            cart.items.push(CartItem::new(product_id, quantity));
        }
        tracing::debug!(%cart_id, %product_id, quantity, "added item to cart");
        Ok(())
    }

    /// Returns a snapshot of the cart, if it exists.
    pub fn get(&self, cart_id: CartId) -> Option<ShoppingCart> {
        self.state.read().unwrap().carts.get(&cart_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_cart_assigns_sequential_ids() {
        let store = CartStore::new();
        let c1 = store.create_cart(CustomerId::new(1));
        let c2 = store.create_cart(CustomerId::new(2));
        assert_eq!(c1, CartId::new(1));
        assert_eq!(c2, CartId::new(2));
    }

    #[test]
    fn add_item_merges_existing_product_line() {
        let store = CartStore::new();
        let cart_id = store.create_cart(CustomerId::new(42));
        store.add_item(cart_id, ProductId::new(1001), 2).unwrap();
        store.add_item(cart_id, ProductId::new(1001), 3).unwrap();
        store.add_item(cart_id, ProductId::new(1002), 1).unwrap();

        let cart = store.get(cart_id).unwrap();
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.items[1].quantity, 1);
    }

    #[test]
    fn add_item_rejects_non_positive_quantity() {
        let store = CartStore::new();
        let cart_id = store.create_cart(CustomerId::new(42));
        assert!(matches!(
            store.add_item(cart_id, ProductId::new(1001), 0),
            Err(CheckoutError::InvalidInput(_))
        ));
    }

    #[test]
    fn add_item_to_missing_cart_fails() {
        let store = CartStore::new();
        assert!(matches!(
            store.add_item(CartId::new(99), ProductId::new(1), 1),
            Err(CheckoutError::CartNotFound(_))
        ));
    }

    #[test]
    fn get_returns_snapshot() {
        let store = CartStore::new();
        let cart_id = store.create_cart(CustomerId::new(7));
        let before = store.get(cart_id).unwrap();
        store.add_item(cart_id, ProductId::new(1), 1).unwrap();
        // The earlier snapshot is unaffected by later mutation.
        assert!(before.items.is_empty());
        assert_eq!(store.get(cart_id).unwrap().items.len(), 1);
    }
}
