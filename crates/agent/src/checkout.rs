//! Checkout lifecycle: pending-order creation, payment session handoff, and
//! idempotent reconciliation of the three racing confirmation sources
//! (webhook, success redirect, inline saved-card capture).

use std::sync::Arc;

use thiserror::Error;

use tably_core::domain::cart::{Cart, CartId};
use tably_core::domain::identity::{Identity, RequestContext};
use tably_core::domain::order::{Order, OrderId, OrderLine, OrderStatus};
use tably_core::errors::DomainError;
use tably_db::repositories::{
    CartStore, CatalogRepository, EventKind, EventLogRepository, OrderRepository, RepositoryError,
};

use crate::payments::{
    ChargeOutcome, GatewayError, PaymentGateway, PaymentStatus, SessionLineItem, SessionMetadata,
    SessionRequest,
};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("authentication required before checkout")]
    LoginRequired,
    #[error("cart has no purchasable lines")]
    EmptyCart,
    #[error("payment provider unavailable: {0}")]
    PaymentProviderUnavailable(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug)]
pub struct CheckoutSession {
    pub order_id: OrderId,
    pub url: String,
    pub session_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This caller won the transition and performed the side effects.
    Applied,
    /// The order was already in a terminal state; nothing to do.
    AlreadySettled,
    /// The session exists but the provider has not confirmed payment.
    NotCompleted,
    UnknownOrder,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayNowOutcome {
    Paid { order_id: OrderId },
    /// Recoverable: the caller should send the user through the redirect
    /// flow instead.
    RequiresRedirect { reason: String },
}

pub struct CheckoutOrchestrator {
    catalog: Arc<dyn CatalogRepository>,
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn EventLogRepository>,
    gateway: Arc<dyn PaymentGateway>,
    urls: CheckoutUrls,
}

impl CheckoutOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn EventLogRepository>,
        gateway: Arc<dyn PaymentGateway>,
        urls: CheckoutUrls,
    ) -> Self {
        Self { catalog, carts, orders, events, gateway, urls }
    }

    /// Creates a pending order from the cart snapshot and hands the caller a
    /// payment redirect. Rolls the order back if the provider call fails, so
    /// no order ever references a dead session.
    pub async fn initiate(&self, ctx: &RequestContext) -> Result<CheckoutSession, CheckoutError> {
        let order = self.create_pending_order(ctx).await?;

        let request = SessionRequest {
            line_items: order
                .lines
                .iter()
                .map(|line| SessionLineItem {
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price_minor: line.unit_price_minor,
                })
                .collect(),
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            metadata: SessionMetadata {
                order_id: order.id.0.clone(),
                cart_id: order.cart_id.0.clone(),
            },
        };

        // The provider call is the only slow point; no lock is held across it.
        let session = match self.gateway.create_session(request).await {
            Ok(session) => session,
            Err(error) => {
                self.rollback_pending(&order.id).await;
                return Err(CheckoutError::PaymentProviderUnavailable(error.to_string()));
            }
        };

        self.orders.set_session_ref(&order.id, &session.session_ref).await?;
        tracing::info!(
            event_name = "checkout.session_created",
            order_id = %order.id.0,
            session_ref = %session.session_ref,
            total_minor = order.total_minor,
            "payment session created"
        );

        Ok(CheckoutSession { order_id: order.id, url: session.url, session_ref: session.session_ref })
    }

    /// Applies a confirmed payment to the order exactly once. Both
    /// out-of-band confirmation sources (webhook body, success-redirect
    /// query string) are caller-supplied, so the session is always verified
    /// with the provider before anything is reconciled; the order and cart
    /// come from the provider's metadata, never from the caller's.
    pub async fn reconcile_session(
        &self,
        session_ref: &str,
    ) -> Result<ReconcileOutcome, CheckoutError> {
        let state = match self.gateway.retrieve_session(session_ref).await {
            Ok(state) => state,
            Err(GatewayError::Rejected(reason)) => {
                tracing::warn!(
                    event_name = "checkout.unknown_session",
                    session_ref = %session_ref,
                    reason = %reason,
                    "payment confirmation for a session the provider does not know"
                );
                return Ok(ReconcileOutcome::UnknownOrder);
            }
            Err(error) => {
                return Err(CheckoutError::PaymentProviderUnavailable(error.to_string()));
            }
        };

        if state.payment_status != PaymentStatus::Paid {
            return Ok(ReconcileOutcome::NotCompleted);
        }
        self.apply_paid_session(&state.metadata, session_ref).await
    }

    /// Status race funnel: losers see `AlreadySettled` and perform no side
    /// effects.
    async fn apply_paid_session(
        &self,
        metadata: &SessionMetadata,
        session_ref: &str,
    ) -> Result<ReconcileOutcome, CheckoutError> {
        let order = match self.orders.find_by_id(&OrderId(metadata.order_id.clone())).await? {
            Some(order) => Some(order),
            None => self.orders.find_by_session_ref(session_ref).await?,
        };
        let Some(order) = order else {
            tracing::warn!(
                event_name = "checkout.unknown_order",
                session_ref = %session_ref,
                "payment confirmation for unknown order"
            );
            return Ok(ReconcileOutcome::UnknownOrder);
        };

        if !self.orders.transition_if_pending(&order.id, OrderStatus::Paid).await? {
            return Ok(ReconcileOutcome::AlreadySettled);
        }

        // The cart named in the session metadata, not the caller's current
        // cart: webhooks arrive with no request context.
        if let Err(error) = self.finalize_paid(&order, &CartId(metadata.cart_id.clone())).await {
            tracing::error!(
                event_name = "checkout.finalize_failed",
                order_id = %order.id.0,
                cart_id = %metadata.cart_id,
                error = %error,
                "order marked paid but finalization failed; cart needs operator attention"
            );
            return Err(error);
        }
        Ok(ReconcileOutcome::Applied)
    }

    /// Saved-instrument direct charge. A decline is an expected outcome that
    /// routes the user to the redirect flow; only provider unavailability is
    /// an error.
    pub async fn pay_now(&self, ctx: &RequestContext) -> Result<PayNowOutcome, CheckoutError> {
        let Identity::User(user) = &ctx.identity else {
            return Err(CheckoutError::LoginRequired);
        };

        let instrument = self
            .gateway
            .default_instrument(user)
            .await
            .map_err(|error| CheckoutError::PaymentProviderUnavailable(error.to_string()))?;
        let Some(instrument) = instrument else {
            return Ok(PayNowOutcome::RequiresRedirect {
                reason: "no saved payment instrument".to_string(),
            });
        };

        let order = self.create_pending_order(ctx).await?;

        match self.gateway.charge(&instrument, order.total_minor).await {
            Ok(ChargeOutcome::Captured) => {
                if self.orders.transition_if_pending(&order.id, OrderStatus::Paid).await? {
                    self.finalize_paid(&order, &order.cart_id).await?;
                }
                Ok(PayNowOutcome::Paid { order_id: order.id })
            }
            Ok(ChargeOutcome::Declined { reason }) => {
                self.orders.transition_if_pending(&order.id, OrderStatus::Failed).await?;
                tracing::info!(
                    event_name = "checkout.charge_declined",
                    order_id = %order.id.0,
                    reason = %reason,
                    "saved-card charge declined, redirect flow required"
                );
                Ok(PayNowOutcome::RequiresRedirect { reason })
            }
            Err(error) => {
                self.rollback_pending(&order.id).await;
                Err(CheckoutError::PaymentProviderUnavailable(error.to_string()))
            }
        }
    }

    /// Auth check, cart snapshot, pending-order insert. Unavailable items
    /// are dropped at snapshot time; a cart with nothing purchasable left is
    /// an empty cart.
    async fn create_pending_order(&self, ctx: &RequestContext) -> Result<Order, CheckoutError> {
        let Identity::User(user) = &ctx.identity else {
            return Err(CheckoutError::LoginRequired);
        };

        let cart = self.carts.resolve(&ctx.identity).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let lines = self.snapshot_lines(&cart).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let order = Order::pending(user.clone(), cart.id.clone(), lines)?;
        self.orders.insert(&order).await?;
        Ok(order)
    }

    async fn snapshot_lines(&self, cart: &Cart) -> Result<Vec<OrderLine>, CheckoutError> {
        let mut lines = Vec::with_capacity(cart.lines.len());
        for cart_line in &cart.lines {
            match self.catalog.get(cart_line.item_id).await? {
                Some(item) if item.is_available => lines.push(OrderLine {
                    item_id: item.id,
                    quantity: cart_line.quantity,
                    unit_price_minor: item.price_minor(),
                    name: item.name,
                }),
                _ => {
                    tracing::debug!(
                        event_name = "checkout.line_dropped",
                        item_id = cart_line.item_id.0,
                        "cart line no longer purchasable, dropped from snapshot"
                    );
                }
            }
        }
        Ok(lines)
    }

    async fn finalize_paid(&self, order: &Order, cart_id: &CartId) -> Result<(), CheckoutError> {
        self.carts.clear(cart_id).await?;
        let owner = Identity::User(order.owner.clone());
        for line in &order.lines {
            self.events.record(&owner, line.item_id, EventKind::Purchase).await?;
        }
        tracing::info!(
            event_name = "checkout.paid",
            order_id = %order.id.0,
            total_minor = order.total_minor,
            "order paid, cart cleared"
        );
        Ok(())
    }

    async fn rollback_pending(&self, order_id: &OrderId) {
        if let Err(error) = self.orders.delete(order_id).await {
            tracing::error!(
                event_name = "checkout.rollback_failed",
                order_id = %order_id.0,
                error = %error,
                "failed to roll back pending order"
            );
        }
    }
}
