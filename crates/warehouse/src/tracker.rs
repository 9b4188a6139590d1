//! Concurrency-safe order aggregator.

use std::collections::HashMap;
use std::sync::Mutex;

use domain::{CartItem, OrderId, ProductId};

#[derive(Default)]
struct TrackerState {
    total_orders: i64,
    product_quantities: HashMap<ProductId, i64>,
}

/// Aggregates the total number of orders and cumulative per-product
/// quantities across all workers.
///
/// One lock covers the whole structure; the critical section is O(items)
/// and short-lived, so sharding is not worth the complexity.
#[derive(Default)]
pub struct OrderTracker {
    state: Mutex<TrackerState>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one order: bumps the total and adds each item's quantity to
    /// its product's running sum. The only mutation entry point.
    pub fn record_order(&self, order_id: OrderId, items: &[CartItem]) {
        let mut state = self.state.lock().unwrap();
        state.total_orders += 1;
        for item in items {
            *state
                .product_quantities
                .entry(item.product_id)
                .or_insert(0) += i64::from(item.quantity);
        }
        tracing::debug!(%order_id, total_orders = state.total_orders, "recorded order");
    }

    /// Total orders recorded so far. An independent snapshot; no
    /// consistency with other calls is implied.
    pub fn total_orders(&self) -> i64 {
        self.state.lock().unwrap().total_orders
    }

    /// Cumulative quantity recorded for `product_id` (zero if never seen).
    pub fn product_quantity(&self, product_id: ProductId) -> i64 {
        self.state
            .lock()
            .unwrap()
            .product_quantities
            .get(&product_id)
            .copied()
            .unwrap_or(0)
    }

    /// Formats a snapshot of the current totals.
    pub fn summary(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut lines = vec![
            "=".repeat(60),
            "WAREHOUSE SUMMARY".to_string(),
            "=".repeat(60),
            format!("Total orders processed: {}", state.total_orders),
        ];
        let mut products: Vec<_> = state.product_quantities.iter().collect();
        products.sort_by_key(|(id, _)| **id);
        for (product_id, quantity) in products {
            lines.push(format!("  product {product_id}: {quantity} units"));
        }
        lines.push("=".repeat(60));
        lines.join("\n")
    }

    /// Logs the summary. Safe to call while recording continues.
    pub fn print_summary(&self) {
        tracing::info!("\n{}", self.summary());
    }
}
