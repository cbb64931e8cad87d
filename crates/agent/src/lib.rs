//! Conversational ordering agent: turns free-form text into menu
//! suggestions, cart mutations, and checkout sessions.
//!
//! # Architecture
//!
//! One message flows through a fixed pipeline:
//! 1. **Extraction** (`extract`) - deterministic parse of intents,
//!    preference facets, and item targets
//! 2. **Planner enrichment** (`planner`) - optional model-backed additions,
//!    degraded silently on any failure
//! 3. **Execution** (`runtime`) - cart mutations, search + rank, or
//!    checkout handoff
//! 4. **Checkout** (`checkout`) - pending-order lifecycle and idempotent
//!    payment reconciliation against the `payments` gateway contract
//!
//! # Safety Principle
//!
//! The planner is strictly a translator. It never mutates state and never
//! widens the operation set; every side effect goes through the
//! deterministic executor.

pub mod checkout;
pub mod extract;
pub mod payments;
pub mod planner;
pub mod runtime;

pub use checkout::{
    CheckoutError, CheckoutOrchestrator, CheckoutSession, CheckoutUrls, PayNowOutcome,
    ReconcileOutcome,
};
pub use extract::{Extraction, LexicalExtractor};
pub use payments::{NoopPaymentGateway, PaymentGateway, SessionMetadata};
pub use planner::{NoopPlanner, Planner, PlannerEnrichment};
pub use runtime::{AgentReply, AgentRuntime};
