//! Payment processor contract. Only the shape of the provider's API is
//! modeled here; the wire client lives behind the trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use tably_core::domain::identity::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price_minor: i64,
}

/// Carried on the session so out-of-band confirmations (webhooks) can find
/// the order and the cart without any request context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub order_id: String,
    pub cart_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: SessionMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentSession {
    pub url: String,
    pub session_ref: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub payment_status: PaymentStatus,
    pub metadata: SessionMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChargeOutcome {
    Captured,
    /// Card-decline-class rejection: expected and recoverable, the caller
    /// falls back to the redirect flow.
    Declined { reason: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
    #[error("payment provider rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: SessionRequest)
        -> Result<PaymentSession, GatewayError>;
    async fn retrieve_session(&self, session_ref: &str) -> Result<SessionState, GatewayError>;
    /// The user's saved payment instrument, if any.
    async fn default_instrument(&self, user: &UserId) -> Result<Option<String>, GatewayError>;
    async fn charge(
        &self,
        instrument_ref: &str,
        amount_minor: i64,
    ) -> Result<ChargeOutcome, GatewayError>;
}

/// Gateway for demos and development: sessions settle instantly, charges
/// always capture, nothing leaves the process.
#[derive(Default)]
pub struct NoopPaymentGateway {
    sessions: Mutex<HashMap<String, SessionMetadata>>,
}

#[async_trait]
impl PaymentGateway for NoopPaymentGateway {
    async fn create_session(
        &self,
        request: SessionRequest,
    ) -> Result<PaymentSession, GatewayError> {
        let session_ref = format!("noop_{}", request.metadata.order_id);
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session_ref.clone(), request.metadata);
        Ok(PaymentSession {
            url: format!("https://payments.invalid/session/{session_ref}"),
            session_ref,
        })
    }

    async fn retrieve_session(&self, session_ref: &str) -> Result<SessionState, GatewayError> {
        let sessions = self.sessions.lock().await;
        let metadata = sessions
            .get(session_ref)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown session `{session_ref}`")))?;
        Ok(SessionState { payment_status: PaymentStatus::Paid, metadata })
    }

    async fn default_instrument(&self, _user: &UserId) -> Result<Option<String>, GatewayError> {
        Ok(None)
    }

    async fn charge(
        &self,
        _instrument_ref: &str,
        _amount_minor: i64,
    ) -> Result<ChargeOutcome, GatewayError> {
        Ok(ChargeOutcome::Captured)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        NoopPaymentGateway, PaymentGateway, PaymentStatus, SessionMetadata, SessionRequest,
    };

    #[tokio::test]
    async fn noop_sessions_round_trip_their_metadata_as_paid() {
        let gateway = NoopPaymentGateway::default();
        let session = gateway
            .create_session(SessionRequest {
                line_items: Vec::new(),
                success_url: "https://example.test/success".to_string(),
                cancel_url: "https://example.test/cancel".to_string(),
                metadata: SessionMetadata {
                    order_id: "order-1".to_string(),
                    cart_id: "cart-1".to_string(),
                },
            })
            .await
            .expect("create session");

        let state = gateway.retrieve_session(&session.session_ref).await.expect("retrieve");
        assert_eq!(state.payment_status, PaymentStatus::Paid);
        assert_eq!(state.metadata.order_id, "order-1");
        assert!(gateway.retrieve_session("sess_unknown").await.is_err());
    }
}
