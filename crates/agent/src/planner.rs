//! Optional planner enrichment over the deterministic extractor.
//!
//! The planner is strictly a translator: it may request a fixed set of named
//! operations, which are folded into the deterministic extraction. Real side
//! effects always go through the runtime's executor. Any failure, timeout,
//! or malformed response degrades silently to the extraction it was given.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use tably_core::domain::menu::MenuItemId;
use tably_core::prefs::{Intent, Vocabulary};

use crate::extract::Extraction;

#[async_trait]
pub trait Planner: Send + Sync {
    /// Returns a JSON array of planned operations for the message.
    async fn plan(&self, message: &str) -> Result<String>;
}

/// A planner that never plans anything. Wired when no model is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPlanner;

#[async_trait]
impl Planner for NoopPlanner {
    async fn plan(&self, _message: &str) -> Result<String> {
        Ok("[]".to_string())
    }
}

/// The only operations a planner may request.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlannedOp {
    SearchMenu {
        terms: Vec<String>,
    },
    AddToCart {
        item_id: i64,
        #[serde(default = "default_quantity")]
        quantity: u32,
    },
    ShowCart,
}

fn default_quantity() -> u32 {
    1
}

pub struct PlannerEnrichment {
    planner: Arc<dyn Planner>,
    vocabulary: Vocabulary,
    timeout: Duration,
}

impl PlannerEnrichment {
    pub fn new(planner: Arc<dyn Planner>, vocabulary: Vocabulary, timeout: Duration) -> Self {
        Self { planner, vocabulary, timeout }
    }

    /// Folds planned operations into `base`. `base` is returned unchanged on
    /// any planner failure.
    pub async fn enrich(&self, message: &str, base: Extraction) -> Extraction {
        let raw = match tokio::time::timeout(self.timeout, self.planner.plan(message)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(error)) => {
                tracing::debug!(event_name = "planner.failed", error = %error, "planner call failed, using deterministic extraction");
                return base;
            }
            Err(_) => {
                tracing::debug!(event_name = "planner.timeout", timeout_ms = self.timeout.as_millis() as u64, "planner timed out, using deterministic extraction");
                return base;
            }
        };

        let ops: Vec<PlannedOp> = match serde_json::from_str(&raw) {
            Ok(ops) => ops,
            Err(error) => {
                tracing::debug!(event_name = "planner.malformed", error = %error, "planner response unparseable, using deterministic extraction");
                return base;
            }
        };

        let mut enriched = base;
        for op in ops {
            match op {
                PlannedOp::SearchMenu { terms } => {
                    // Unknown terms are dropped: the planner cannot widen the
                    // vocabulary.
                    for term in terms {
                        let term = term.to_lowercase();
                        for entry in self.vocabulary.entries() {
                            if entry.term == term {
                                enriched.prefs.insert(entry.facet, &entry.canonical);
                            }
                        }
                    }
                    enriched.intents.insert(Intent::Discover);
                }
                PlannedOp::AddToCart { item_id, quantity } => {
                    enriched.push_add_target(MenuItemId(item_id), quantity.max(1));
                    enriched.intents.insert(Intent::AddToCart);
                }
                PlannedOp::ShowCart => {
                    enriched.intents.insert(Intent::ShowCart);
                }
            }
        }
        enriched
    }
}
