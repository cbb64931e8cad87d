//! Per-message orchestration: extract, mutate the cart, search and rank,
//! or hand off to checkout.

use std::sync::Arc;

use serde::Serialize;

use tably_core::domain::identity::RequestContext;
use tably_core::domain::menu::{MenuItem, MenuItemId};
use tably_core::errors::ApplicationError;
use tably_core::prefs::{Intent, PreferenceSet};
use tably_core::rank::{rank, DEFAULT_SUGGESTION_LIMIT};
use tably_core::search::filter_candidates;
use tably_db::repositories::{CartStore, CatalogRepository, EventKind, EventLogRepository,
    RepositoryError};

use crate::checkout::{CheckoutError, CheckoutOrchestrator};
use crate::extract::LexicalExtractor;
use crate::planner::PlannerEnrichment;

const SUGGEST_FOLLOW_UP: &str =
    "Anything catch your eye? Say \"add <item number>\" to add it, or \"checkout\" when ready.";
const ADDED_FOLLOW_UP: &str = "Added. Say \"show cart\" to review, or \"checkout\" when ready.";
const CHECKOUT_FOLLOW_UP: &str = "Follow the payment link to complete your order.";
const LOGIN_PROMPT: &str = "Please log in to check out. Your cart is saved.";

const HISTORY_TAG_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AddedItem {
    pub item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
}

/// The produced message-out surface, serialized verbatim by the interface
/// layer.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AgentReply {
    pub detected_prefs: PreferenceSet,
    pub suggestions: Vec<MenuItem>,
    pub added_items: Vec<AddedItem>,
    pub follow_up: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    pub require_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct AgentRuntime {
    extractor: LexicalExtractor,
    planner: Option<PlannerEnrichment>,
    catalog: Arc<dyn CatalogRepository>,
    carts: Arc<dyn CartStore>,
    events: Arc<dyn EventLogRepository>,
    checkout: CheckoutOrchestrator,
}

impl AgentRuntime {
    pub fn new(
        extractor: LexicalExtractor,
        catalog: Arc<dyn CatalogRepository>,
        carts: Arc<dyn CartStore>,
        events: Arc<dyn EventLogRepository>,
        checkout: CheckoutOrchestrator,
    ) -> Self {
        Self { extractor, planner: None, catalog, carts, events, checkout }
    }

    pub fn with_planner(mut self, planner: PlannerEnrichment) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.checkout
    }

    pub async fn handle_message(
        &self,
        ctx: &RequestContext,
        text: &str,
    ) -> Result<AgentReply, ApplicationError> {
        let mut extraction = self.extractor.extract(text);
        if let Some(planner) = &self.planner {
            extraction = planner.enrich(text, extraction).await;
        }
        tracing::debug!(
            event_name = "agent.extracted",
            correlation_id = %ctx.correlation_id,
            primary_intent = ?extraction.primary_intent(),
            add_targets = extraction.add_targets.len(),
            remove_targets = extraction.remove_targets.len(),
            "message extracted"
        );

        let mut reply = AgentReply {
            detected_prefs: extraction.prefs.clone(),
            follow_up: SUGGEST_FOLLOW_UP.to_string(),
            ..AgentReply::default()
        };
        let mut item_errors = Vec::new();

        // Cart mutations happen even when checkout is also requested, so an
        // unauthenticated "order 3 and checkout" still fills the cart.
        if !extraction.add_targets.is_empty() || !extraction.remove_targets.is_empty() {
            let cart = self.carts.resolve(&ctx.identity).await.map_err(persistence)?;
            for target in &extraction.add_targets {
                match self.catalog.get(target.item_id).await.map_err(persistence)? {
                    Some(item) if item.is_available => {
                        self.carts
                            .add_line(&cart.id, target.item_id, target.quantity)
                            .await
                            .map_err(persistence)?;
                        self.events
                            .record(&ctx.identity, target.item_id, EventKind::Add)
                            .await
                            .map_err(persistence)?;
                        reply.added_items.push(AddedItem {
                            item_id: target.item_id,
                            name: item.name,
                            quantity: target.quantity,
                        });
                    }
                    // Reported per item; the rest of the message still runs.
                    _ => item_errors
                        .push(format!("item {} is not on the menu right now", target.item_id.0)),
                }
            }
            for target in &extraction.remove_targets {
                self.carts.remove_line(&cart.id, target.item_id).await.map_err(persistence)?;
            }
            if !reply.added_items.is_empty() {
                reply.follow_up = ADDED_FOLLOW_UP.to_string();
            }
        }

        if extraction.intents.contains(&Intent::Checkout) {
            match self.checkout.initiate(ctx).await {
                Ok(session) => {
                    reply.checkout_url = Some(session.url);
                    reply.follow_up = CHECKOUT_FOLLOW_UP.to_string();
                }
                Err(CheckoutError::LoginRequired) => {
                    reply.require_login = true;
                    reply.follow_up = LOGIN_PROMPT.to_string();
                }
                Err(CheckoutError::EmptyCart) => {
                    item_errors
                        .push("your cart is empty; add an item before checking out".to_string());
                }
                Err(CheckoutError::PaymentProviderUnavailable(_)) => {
                    item_errors.push(
                        "payments are unavailable right now; try again from your cart".to_string(),
                    );
                }
                Err(CheckoutError::Repository(error)) => return Err(persistence(error)),
                Err(CheckoutError::Domain(error)) => return Err(ApplicationError::Domain(error)),
            }
        } else if extraction.primary_intent() == Intent::ShowCart {
            reply.follow_up = self.cart_summary(ctx).await?;
        } else {
            let available = self.catalog.list_available().await.map_err(persistence)?;
            let candidates = filter_candidates(&available, &extraction.prefs);
            let history = self
                .events
                .top_tags(&ctx.identity, HISTORY_TAG_LIMIT)
                .await
                .map_err(persistence)?;
            reply.suggestions =
                rank(candidates, &extraction.prefs, &available, &history, DEFAULT_SUGGESTION_LIMIT);
        }

        if !item_errors.is_empty() {
            reply.error = Some(item_errors.join("; "));
        }
        Ok(reply)
    }

    async fn cart_summary(&self, ctx: &RequestContext) -> Result<String, ApplicationError> {
        let cart = self.carts.resolve(&ctx.identity).await.map_err(persistence)?;
        if cart.is_empty() {
            return Ok("Your cart is empty.".to_string());
        }

        let mut parts = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let name = match self.catalog.get(line.item_id).await.map_err(persistence)? {
                Some(item) => item.name,
                None => format!("item {}", line.item_id.0),
            };
            parts.push(format!("{}x {name}", line.quantity));
        }
        Ok(format!("In your cart: {}.", parts.join(", ")))
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
