//! HTTP API server for the checkout side of the fulfillment pipeline.
//!
//! Exposes cart management and the checkout contract, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use broker::SessionPool;
use checkout::{CartStore, CheckoutOrchestrator, OrderPublisher, PaymentGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::carts::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<G: PaymentGateway + 'static>(
    state: Arc<AppState<G>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/shopping-carts", post(routes::carts::create::<G>))
        .route("/shopping-carts/{id}", get(routes::carts::get::<G>))
        .route(
            "/shopping-carts/{id}/items",
            post(routes::carts::add_item::<G>),
        )
        .route(
            "/shopping-carts/{id}/checkout",
            post(routes::carts::checkout::<G>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the application state: cart store, payment gateway, publisher
/// backed by the given session pool.
pub fn create_state<G: PaymentGateway + 'static>(
    pool: Arc<SessionPool>,
    queue: &str,
    gateway: G,
) -> Arc<AppState<G>> {
    let carts = Arc::new(CartStore::new());
    let publisher = OrderPublisher::new(pool, queue);
    let orchestrator = CheckoutOrchestrator::new(Arc::clone(&carts), gateway, publisher);
    Arc::new(AppState {
        carts,
        orchestrator,
    })
}
