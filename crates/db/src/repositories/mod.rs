use async_trait::async_trait;
use thiserror::Error;

use tably_core::domain::cart::{Cart, CartId};
use tably_core::domain::identity::Identity;
use tably_core::domain::menu::{MenuItem, MenuItemId};
use tably_core::domain::order::{Order, OrderId, OrderStatus};

pub mod cart;
pub mod catalog;
pub mod events;
pub mod memory;
pub mod order;

pub use cart::SqlCartStore;
pub use catalog::SqlCatalogRepository;
pub use events::SqlEventLogRepository;
pub use memory::{
    InMemoryCartStore, InMemoryCatalogRepository, InMemoryEventLogRepository,
    InMemoryOrderRepository,
};
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// Persisted state that violates a domain invariant. Never repaired in
    /// place; the operation aborts and the caller logs it for an operator.
    #[error("corrupted persisted state: {0}")]
    Corrupted(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    View,
    Click,
    Add,
    Purchase,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Click => "click",
            Self::Add => "add",
            Self::Purchase => "buy",
        }
    }
}

/// Read interface over the menu catalog. `upsert` exists for seeding and
/// tests; the core never writes through it.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_available(&self) -> Result<Vec<MenuItem>, RepositoryError>;
    async fn get(&self, id: MenuItemId) -> Result<Option<MenuItem>, RepositoryError>;
    async fn upsert(&self, item: MenuItem) -> Result<(), RepositoryError>;
}

/// Keyed cart persistence. Mutations on one cart are linearized by the
/// implementation (single-statement upsert in SQL, a per-cart lock in
/// memory); two concurrent adds of the same item must both land.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Exactly one cart per identity, created on first touch.
    async fn resolve(&self, identity: &Identity) -> Result<Cart, RepositoryError>;
    async fn find_by_id(&self, id: &CartId) -> Result<Option<Cart>, RepositoryError>;
    async fn add_line(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError>;
    async fn remove_line(&self, cart_id: &CartId, item_id: MenuItemId)
        -> Result<(), RepositoryError>;
    /// Quantities at or below zero delete the line.
    async fn set_line_quantity(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
        quantity: i64,
    ) -> Result<(), RepositoryError>;
    async fn clear(&self, cart_id: &CartId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn find_by_session_ref(
        &self,
        session_ref: &str,
    ) -> Result<Option<Order>, RepositoryError>;
    async fn set_session_ref(
        &self,
        id: &OrderId,
        session_ref: &str,
    ) -> Result<(), RepositoryError>;
    /// Compare-and-set `Pending -> next`. Returns true only for the caller
    /// that performed the transition; racing callers observe false.
    async fn transition_if_pending(
        &self,
        id: &OrderId,
        next: OrderStatus,
    ) -> Result<bool, RepositoryError>;
    /// Rollback of a pending order whose payment session never materialized.
    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError>;
}

/// Interaction history behind the blended recommendation tier.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn record(
        &self,
        identity: &Identity,
        item_id: MenuItemId,
        kind: EventKind,
    ) -> Result<(), RepositoryError>;
    /// Most frequent tags across the identity's logged items, ordered by
    /// count descending then tag ascending.
    async fn top_tags(
        &self,
        identity: &Identity,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError>;
}
