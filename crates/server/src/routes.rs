//! HTTP surface: the agent message endpoint, checkout lifecycle routes, the
//! payment webhook, and direct cart manipulation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tably_agent::checkout::{CheckoutError, PayNowOutcome, ReconcileOutcome};
use tably_agent::runtime::{AgentReply, AgentRuntime};
use tably_core::domain::identity::{GuestToken, Identity, RequestContext, UserId};
use tably_core::domain::menu::MenuItemId;
use tably_core::errors::{ApplicationError, InterfaceError};
use tably_db::repositories::CartStore;

const SESSION_COMPLETED_EVENT: &str = "checkout.session.completed";

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub carts: Arc<dyn CartStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agent/message", post(post_message))
        .route("/checkout/session", post(post_checkout_session))
        .route("/checkout/pay", post(post_checkout_pay))
        .route("/checkout/success", get(get_checkout_success))
        .route("/checkout/cancel", get(get_checkout_cancel))
        .route("/webhooks/payment", post(post_payment_webhook))
        .route("/cart", get(get_cart))
        .route("/cart/items", put(put_cart_item))
        .route("/cart/items/{item_id}", axum::routing::delete(delete_cart_item))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    correlation_id: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, correlation_id: &str) -> Self {
        Self { status, message: message.into(), correlation_id: correlation_id.to_string() }
    }

    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        tracing::error!(
            event_name = "http.request_failed",
            correlation_id = %correlation_id,
            error = %error,
            "request failed"
        );
        let interface = error.into_interface(correlation_id);
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, interface.user_message(), correlation_id)
    }

    fn from_checkout(error: CheckoutError, correlation_id: &str) -> Self {
        match error {
            CheckoutError::LoginRequired => Self::new(
                StatusCode::UNAUTHORIZED,
                "log in to check out; your cart is saved",
                correlation_id,
            ),
            CheckoutError::EmptyCart => Self::new(
                StatusCode::CONFLICT,
                "your cart is empty; add an item before checking out",
                correlation_id,
            ),
            CheckoutError::PaymentProviderUnavailable(detail) => {
                tracing::warn!(
                    event_name = "http.payment_provider_unavailable",
                    correlation_id = %correlation_id,
                    detail = %detail,
                    "payment provider unavailable"
                );
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "payments are unavailable right now; try again from your cart",
                    correlation_id,
                )
            }
            CheckoutError::Repository(error) => Self::from_application(
                ApplicationError::Persistence(error.to_string()),
                correlation_id,
            ),
            CheckoutError::Domain(error) => {
                Self::from_application(ApplicationError::Domain(error), correlation_id)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "correlation_id": self.correlation_id,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Identity headers set by the fronting auth layer: `x-user-id` for
/// authenticated users, `x-guest-token` for returning guests.
fn identity_from_headers(
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<Option<Identity>, ApiError> {
    let user = header_value(headers, "x-user-id");
    let guest = header_value(headers, "x-guest-token");
    match (user, guest) {
        (Some(_), Some(_)) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "provide either x-user-id or x-guest-token, not both",
            correlation_id,
        )),
        (Some(user), None) => Ok(Some(Identity::User(UserId(user)))),
        (None, Some(token)) => Ok(Some(Identity::Guest(GuestToken(token)))),
        (None, None) => Ok(None),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn require_identity(headers: &HeaderMap, correlation_id: &str) -> Result<Identity, ApiError> {
    identity_from_headers(headers, correlation_id)?.ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "an x-user-id or x-guest-token header is required",
            correlation_id,
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(flatten)]
    pub reply: AgentReply,
    /// Set when the server minted a fresh guest identity for this caller;
    /// clients must send it back on subsequent requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_token: Option<String>,
}

async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let (identity, minted_token) = match identity_from_headers(&headers, &correlation_id)? {
        Some(identity) => (identity, None),
        None => {
            let token = GuestToken::generate();
            (Identity::Guest(token.clone()), Some(token.0))
        }
    };

    let ctx = RequestContext::new(identity, correlation_id.clone());
    let reply = state
        .runtime
        .handle_message(&ctx, &request.message)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(MessageResponse { reply, guest_token: minted_token }))
}

#[derive(Debug, Serialize)]
pub struct CheckoutSessionResponse {
    pub url: String,
    pub session_ref: String,
    pub order_id: String,
}

async fn post_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CheckoutSessionResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let identity = require_identity(&headers, &correlation_id)?;
    let ctx = RequestContext::new(identity, correlation_id.clone());

    let session = state
        .runtime
        .checkout()
        .initiate(&ctx)
        .await
        .map_err(|error| ApiError::from_checkout(error, &correlation_id))?;

    Ok(Json(CheckoutSessionResponse {
        url: session.url,
        session_ref: session.session_ref,
        order_id: session.order_id.0,
    }))
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayNowResponse {
    Paid { order_id: String },
    RequiresRedirect { reason: String },
}

async fn post_checkout_pay(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PayNowResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let identity = require_identity(&headers, &correlation_id)?;
    let ctx = RequestContext::new(identity, correlation_id.clone());

    let outcome = state
        .runtime
        .checkout()
        .pay_now(&ctx)
        .await
        .map_err(|error| ApiError::from_checkout(error, &correlation_id))?;

    Ok(Json(match outcome {
        PayNowOutcome::Paid { order_id } => PayNowResponse::Paid { order_id: order_id.0 },
        PayNowOutcome::RequiresRedirect { reason } => PayNowResponse::RequiresRedirect { reason },
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub outcome: &'static str,
    pub message: &'static str,
}

fn reconcile_response(outcome: ReconcileOutcome) -> ReconcileResponse {
    match outcome {
        ReconcileOutcome::Applied => {
            ReconcileResponse { outcome: "applied", message: "Payment confirmed. Order placed." }
        }
        ReconcileOutcome::AlreadySettled => ReconcileResponse {
            outcome: "already_settled",
            message: "Payment confirmed. Order placed.",
        },
        ReconcileOutcome::NotCompleted => ReconcileResponse {
            outcome: "not_completed",
            message: "Payment has not completed yet.",
        },
        ReconcileOutcome::UnknownOrder => {
            ReconcileResponse { outcome: "unknown_order", message: "No matching order was found." }
        }
    }
}

/// Browser redirect after payment. The session reference comes from the
/// query string; the orchestrator verifies it with the provider before
/// reconciling.
async fn get_checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let outcome = state
        .runtime
        .checkout()
        .reconcile_session(&query.session_id)
        .await
        .map_err(|error| ApiError::from_checkout(error, &correlation_id))?;
    Ok(Json(reconcile_response(outcome)))
}

async fn get_checkout_cancel() -> Json<ReconcileResponse> {
    Json(ReconcileResponse {
        outcome: "canceled",
        message: "Checkout canceled. Your cart is unchanged.",
    })
}

/// Only the event type and session reference are read from the body; any
/// metadata a provider attaches is ignored. Unknown fields are dropped by
/// serde, so richer provider payloads still parse.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub session_ref: String,
}

/// Webhook bodies are attacker-supplied: the session reference is only a
/// lookup key, and the orchestrator re-fetches the session from the
/// provider before any state changes.
async fn post_payment_webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    if event.event_type != SESSION_COMPLETED_EVENT {
        tracing::debug!(
            event_name = "webhook.ignored",
            correlation_id = %correlation_id,
            event_type = %event.event_type,
            "unhandled webhook event type"
        );
        return Ok(Json(ReconcileResponse { outcome: "ignored", message: "Event ignored." }));
    }

    let outcome = state
        .runtime
        .checkout()
        .reconcile_session(&event.session_ref)
        .await
        .map_err(|error| ApiError::from_checkout(error, &correlation_id))?;
    Ok(Json(reconcile_response(outcome)))
}

#[derive(Debug, Serialize)]
pub struct CartLineResponse {
    pub item_id: i64,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart_id: String,
    pub lines: Vec<CartLineResponse>,
}

async fn get_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CartResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let identity = require_identity(&headers, &correlation_id)?;

    let cart = state.carts.resolve(&identity).await.map_err(|error| {
        ApiError::from_application(ApplicationError::Persistence(error.to_string()), &correlation_id)
    })?;

    Ok(Json(CartResponse {
        cart_id: cart.id.0.clone(),
        lines: cart
            .lines
            .iter()
            .map(|line| CartLineResponse { item_id: line.item_id.0, quantity: line.quantity })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub item_id: i64,
    pub quantity: i64,
}

/// Sets a line's quantity outright; zero or negative deletes the line.
async fn put_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetQuantityRequest>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let identity = require_identity(&headers, &correlation_id)?;

    let cart = state.carts.resolve(&identity).await.map_err(|error| {
        ApiError::from_application(ApplicationError::Persistence(error.to_string()), &correlation_id)
    })?;
    state
        .carts
        .set_line_quantity(&cart.id, MenuItemId(request.item_id), request.quantity)
        .await
        .map_err(|error| {
            ApiError::from_application(
                ApplicationError::Persistence(error.to_string()),
                &correlation_id,
            )
        })?;

    Ok(StatusCode::NO_CONTENT)
}

async fn delete_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let identity = require_identity(&headers, &correlation_id)?;

    let cart = state.carts.resolve(&identity).await.map_err(|error| {
        ApiError::from_application(ApplicationError::Persistence(error.to_string()), &correlation_id)
    })?;
    state.carts.remove_line(&cart.id, MenuItemId(item_id)).await.map_err(|error| {
        ApiError::from_application(ApplicationError::Persistence(error.to_string()), &correlation_id)
    })?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::Json;
    use rust_decimal::Decimal;

    use tably_agent::checkout::{CheckoutOrchestrator, CheckoutUrls};
    use tably_agent::payments::NoopPaymentGateway;
    use tably_agent::runtime::AgentRuntime;
    use tably_agent::LexicalExtractor;
    use tably_core::domain::menu::{MenuItem, MenuItemId};
    use tably_db::repositories::{
        CatalogRepository, InMemoryCartStore, InMemoryCatalogRepository,
        InMemoryEventLogRepository, InMemoryOrderRepository,
    };

    use super::{
        get_checkout_success, identity_from_headers, post_checkout_session, post_message,
        post_payment_webhook, AppState, MessageRequest, SuccessQuery, WebhookEvent,
    };

    async fn state() -> AppState {
        let catalog = Arc::new(InMemoryCatalogRepository::default());
        catalog
            .upsert(MenuItem {
                id: MenuItemId(1),
                name: "Vegan Chili Bowl".to_string(),
                description: String::new(),
                price: Decimal::new(800, 2),
                is_available: true,
                tags: vec!["vegan".to_string(), "spicy".to_string()],
                popularity: 50,
            })
            .await
            .expect("seed item");
        let carts = Arc::new(InMemoryCartStore::default());
        let events = Arc::new(InMemoryEventLogRepository::new(Arc::clone(&catalog)));
        let checkout = CheckoutOrchestrator::new(
            catalog.clone(),
            carts.clone(),
            Arc::new(InMemoryOrderRepository::default()),
            events.clone(),
            Arc::new(NoopPaymentGateway::default()),
            CheckoutUrls {
                success_url: "https://app.test/checkout/success".to_string(),
                cancel_url: "https://app.test/checkout/cancel".to_string(),
            },
        );
        let runtime = AgentRuntime::new(
            LexicalExtractor::default(),
            catalog,
            carts.clone(),
            events,
            checkout,
        );
        AppState { runtime: Arc::new(runtime), carts }
    }

    fn user_headers(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_str(id).expect("header"));
        headers
    }

    #[test]
    fn conflicting_identity_headers_are_rejected() {
        let mut headers = user_headers("u-1");
        headers.insert("x-guest-token", HeaderValue::from_static("tok-1"));
        assert!(identity_from_headers(&headers, "test").is_err());
    }

    #[tokio::test]
    async fn anonymous_message_mints_a_guest_token() {
        let state = state().await;
        let Json(response) = post_message(
            State(state),
            HeaderMap::new(),
            Json(MessageRequest { message: "something spicy".to_string() }),
        )
        .await
        .expect("handle message");

        assert!(response.guest_token.is_some());
        assert!(!response.reply.suggestions.is_empty());
    }

    #[tokio::test]
    async fn checkout_session_round_trips_through_the_success_redirect() {
        let state = state().await;
        let headers = user_headers("u-route");

        post_message(
            State(state.clone()),
            headers.clone(),
            Json(MessageRequest { message: "order 1".to_string() }),
        )
        .await
        .expect("fill cart");

        let Json(session) = post_checkout_session(State(state.clone()), headers)
            .await
            .expect("create checkout session");

        let Json(reconciled) = get_checkout_success(
            State(state),
            Query(SuccessQuery { session_id: session.session_ref }),
        )
        .await
        .expect("success redirect");
        assert_eq!(reconciled.outcome, "applied");
    }

    #[tokio::test]
    async fn unknown_webhook_event_types_are_ignored() {
        let state = state().await;
        let Json(response) = post_payment_webhook(
            State(state),
            Json(WebhookEvent {
                event_type: "charge.refunded".to_string(),
                session_ref: "sess_x".to_string(),
            }),
        )
        .await
        .expect("webhook handled");
        assert_eq!(response.outcome, "ignored");
    }

    #[tokio::test]
    async fn webhook_with_a_fabricated_session_ref_changes_nothing() {
        let state = state().await;
        let Json(response) = post_payment_webhook(
            State(state),
            Json(WebhookEvent {
                event_type: "checkout.session.completed".to_string(),
                session_ref: "sess_forged".to_string(),
            }),
        )
        .await
        .expect("webhook handled");
        assert_eq!(response.outcome, "unknown_order");
    }

    #[tokio::test]
    async fn guest_checkout_is_unauthorized() {
        let state = state().await;
        let mut headers = HeaderMap::new();
        headers.insert("x-guest-token", HeaderValue::from_static("tok-9"));

        let error = post_checkout_session(State(state), headers)
            .await
            .err()
            .expect("guests cannot check out");
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
    }
}
