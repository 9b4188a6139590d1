//! Payment gateway trait and implementations.
//!
//! The authorization decision is a remote capability; it is injected so
//! tests can force deterministic outcomes instead of depending on the
//! remote service's behavior.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the payment gateway, all distinct from a decline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached.
    #[error("gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway rejected the request as malformed (e.g. bad card
    /// number format).
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    /// The gateway answered with something outside its contract.
    #[error("unexpected gateway response (status {0})")]
    UnexpectedStatus(u16),
}

/// Outcome of a credit card authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Authorized,
    Declined,
}

/// Remote capability deciding whether a payment goes through.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes a payment against the supplied card number.
    ///
    /// A structured decline is a successful call returning
    /// [`AuthorizationOutcome::Declined`]; errors mean no decision was
    /// reached.
    async fn authorize(&self, card_number: &str) -> Result<AuthorizationOutcome, GatewayError>;
}

#[derive(Serialize)]
struct AuthorizationRequest<'a> {
    credit_card_number: &'a str,
}

#[derive(Deserialize)]
struct AuthorizationResponse {
    status: String,
}

/// HTTP client for the remote authorization service.
pub struct HttpPaymentGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn authorize(&self, card_number: &str) -> Result<AuthorizationOutcome, GatewayError> {
        let url = format!("{}/authorize", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&AuthorizationRequest {
                credit_card_number: card_number,
            })
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            // 200 carries "Authorized"; 402 carries "Declined". Both are
            // decisions, parsed from the same body shape.
            200 | 402 => {
                let body: AuthorizationResponse = response.json().await?;
                match body.status.as_str() {
                    "Authorized" => Ok(AuthorizationOutcome::Authorized),
                    "Declined" => Ok(AuthorizationOutcome::Declined),
                    other => {
                        tracing::warn!(status = other, "unknown authorization status");
                        Err(GatewayError::UnexpectedStatus(status.as_u16()))
                    }
                }
            }
            400 => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Rejected(body))
            }
            code => Err(GatewayError::UnexpectedStatus(code)),
        }
    }
}

/// Masks all but the last four digits of a card number for logging.
pub fn mask_card_number(card_number: &str) -> String {
    match card_number
        .len()
        .checked_sub(4)
        .and_then(|i| card_number.get(i..))
    {
        Some(tail) => format!("****-****-****-{tail}"),
        None => "****".to_string(),
    }
}

#[derive(Debug, Default)]
struct StaticGatewayState {
    decline: bool,
    unavailable: bool,
    calls: u32,
}

/// Deterministic in-memory gateway for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticPaymentGateway {
    state: Arc<RwLock<StaticGatewayState>>,
}

impl StaticPaymentGateway {
    /// Creates a gateway that authorizes everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces every subsequent authorization to be declined.
    pub fn set_decline(&self, decline: bool) {
        self.state.write().unwrap().decline = decline;
    }

    /// Makes the gateway unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Number of authorization calls received.
    pub fn call_count(&self) -> u32 {
        self.state.read().unwrap().calls
    }
}

#[async_trait]
impl PaymentGateway for StaticPaymentGateway {
    async fn authorize(&self, card_number: &str) -> Result<AuthorizationOutcome, GatewayError> {
        let mut state = self.state.write().unwrap();
        state.calls += 1;
        tracing::debug!(card = %mask_card_number(card_number), "stub authorization");
        if state.unavailable {
            return Err(GatewayError::Rejected(
                "gateway forced unavailable".to_string(),
            ));
        }
        if state.decline {
            Ok(AuthorizationOutcome::Declined)
        } else {
            Ok(AuthorizationOutcome::Authorized)
        }
    }
}
