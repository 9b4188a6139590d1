//! Shopping cart and checkout endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{CartStore, CheckoutOrchestrator, PaymentGateway, ShoppingCart};
use domain::{CartId, CustomerId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<G: PaymentGateway> {
    pub carts: Arc<CartStore>,
    pub orchestrator: CheckoutOrchestrator<G>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCartRequest {
    pub customer_id: i32,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub credit_card_number: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CreateCartResponse {
    pub shopping_cart_id: CartId,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: domain::OrderId,
}

// -- Handlers --

/// POST /shopping-carts — create an empty cart for a customer.
#[tracing::instrument(skip(state, req))]
pub async fn create<G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<G>>>,
    Json(req): Json<CreateCartRequest>,
) -> Result<(StatusCode, Json<CreateCartResponse>), ApiError> {
    if req.customer_id <= 0 {
        return Err(ApiError::BadRequest(
            "customer_id must be a positive integer".to_string(),
        ));
    }
    let shopping_cart_id = state.carts.create_cart(CustomerId::new(req.customer_id));
    Ok((
        StatusCode::CREATED,
        Json(CreateCartResponse { shopping_cart_id }),
    ))
}

/// POST /shopping-carts/:id/items — add a product line to a cart.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<G>>>,
    Path(cart_id): Path<i32>,
    Json(req): Json<AddItemRequest>,
) -> Result<StatusCode, ApiError> {
    let cart_id = parse_cart_id(cart_id)?;
    if req.product_id <= 0 {
        return Err(ApiError::BadRequest(
            "product_id must be a positive integer".to_string(),
        ));
    }
    state
        .carts
        .add_item(cart_id, ProductId::new(req.product_id), req.quantity)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /shopping-carts/:id — fetch a cart snapshot.
#[tracing::instrument(skip(state))]
pub async fn get<G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<G>>>,
    Path(cart_id): Path<i32>,
) -> Result<Json<ShoppingCart>, ApiError> {
    let cart_id = parse_cart_id(cart_id)?;
    let cart = state
        .carts
        .get(cart_id)
        .ok_or(checkout::CheckoutError::CartNotFound(cart_id))?;
    Ok(Json(cart))
}

/// POST /shopping-carts/:id/checkout — authorize payment and hand the
/// order to the warehouse.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<G>>>,
    Path(cart_id): Path<i32>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let cart_id = parse_cart_id(cart_id)?;
    let order_id = state
        .orchestrator
        .checkout(cart_id, &req.credit_card_number)
        .await?;
    Ok(Json(CheckoutResponse { order_id }))
}

fn parse_cart_id(raw: i32) -> Result<CartId, ApiError> {
    if raw <= 0 {
        return Err(ApiError::BadRequest(
            "shopping cart ID must be a positive integer".to_string(),
        ));
    }
    Ok(CartId::new(raw))
}
