//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
///
/// Responses carry a stable error code plus a human-readable message:
/// `{"error": "CODE", "message": "…"}`.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout pipeline error.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": code, "message": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        CheckoutError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", message),
        CheckoutError::CartNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
        CheckoutError::EmptyCart(_) => (StatusCode::BAD_REQUEST, "EMPTY_CART", message),
        CheckoutError::Authorization(_) => {
            (StatusCode::BAD_REQUEST, "AUTHORIZATION_ERROR", message)
        }
        CheckoutError::PaymentDeclined => {
            (StatusCode::PAYMENT_REQUIRED, "PAYMENT_DECLINED", message)
        }
        CheckoutError::Publish(_) => {
            tracing::error!(error = %message, "failed to publish order");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ORDER_PROCESSING_ERROR",
                message,
            )
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}
