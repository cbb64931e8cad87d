//! In-memory repository doubles. They honor the same concurrency contracts
//! as the SQL implementations (per-cart linearization, CAS order status) so
//! the orchestration crates can be tested without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use tably_core::domain::cart::{Cart, CartId};
use tably_core::domain::identity::Identity;
use tably_core::domain::menu::{MenuItem, MenuItemId};
use tably_core::domain::order::{Order, OrderId, OrderStatus};

use super::{
    CartStore, CatalogRepository, EventKind, EventLogRepository, OrderRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    items: RwLock<BTreeMap<i64, MenuItem>>,
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_available(&self) -> Result<Vec<MenuItem>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.values().filter(|item| item.is_available).cloned().collect())
    }

    async fn get(&self, id: MenuItemId) -> Result<Option<MenuItem>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.get(&id.0).cloned())
    }

    async fn upsert(&self, item: MenuItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(item.id.0, item);
        Ok(())
    }
}

/// Carts are held behind one lock per cart; the outer maps are only locked
/// long enough to find or create the entry, so mutations on unrelated carts
/// never serialize against each other.
#[derive(Default)]
pub struct InMemoryCartStore {
    by_owner: RwLock<HashMap<Identity, CartId>>,
    carts: RwLock<HashMap<CartId, Arc<Mutex<Cart>>>>,
}

impl InMemoryCartStore {
    async fn cart_handle(&self, cart_id: &CartId) -> Option<Arc<Mutex<Cart>>> {
        let carts = self.carts.read().await;
        carts.get(cart_id).cloned()
    }

    async fn require_handle(&self, cart_id: &CartId) -> Result<Arc<Mutex<Cart>>, RepositoryError> {
        self.cart_handle(cart_id)
            .await
            .ok_or_else(|| RepositoryError::Decode(format!("unknown cart `{}`", cart_id.0)))
    }
}

#[async_trait::async_trait]
impl CartStore for InMemoryCartStore {
    async fn resolve(&self, identity: &Identity) -> Result<Cart, RepositoryError> {
        if let Some(cart_id) = self.by_owner.read().await.get(identity).cloned() {
            let handle = self.require_handle(&cart_id).await?;
            let cart = handle.lock().await;
            return Ok(cart.clone());
        }

        let mut by_owner = self.by_owner.write().await;
        // Re-check under the write lock; a racing resolve may have won.
        if let Some(cart_id) = by_owner.get(identity).cloned() {
            drop(by_owner);
            let handle = self.require_handle(&cart_id).await?;
            let cart = handle.lock().await;
            return Ok(cart.clone());
        }

        let cart = Cart::new(identity.clone());
        by_owner.insert(identity.clone(), cart.id.clone());
        let mut carts = self.carts.write().await;
        carts.insert(cart.id.clone(), Arc::new(Mutex::new(cart.clone())));
        Ok(cart)
    }

    async fn find_by_id(&self, id: &CartId) -> Result<Option<Cart>, RepositoryError> {
        match self.cart_handle(id).await {
            Some(handle) => {
                let cart = handle.lock().await;
                Ok(Some(cart.clone()))
            }
            None => Ok(None),
        }
    }

    async fn add_line(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let handle = self.require_handle(cart_id).await?;
        let mut cart = handle.lock().await;
        cart.apply_add(item_id, quantity.max(1));
        Ok(())
    }

    async fn remove_line(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
    ) -> Result<(), RepositoryError> {
        let handle = self.require_handle(cart_id).await?;
        let mut cart = handle.lock().await;
        cart.apply_remove(item_id);
        Ok(())
    }

    async fn set_line_quantity(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
        quantity: i64,
    ) -> Result<(), RepositoryError> {
        let handle = self.require_handle(cart_id).await?;
        let mut cart = handle.lock().await;
        cart.set_quantity(item_id, quantity);
        Ok(())
    }

    async fn clear(&self, cart_id: &CartId) -> Result<(), RepositoryError> {
        let handle = self.require_handle(cart_id).await?;
        let mut cart = handle.lock().await;
        cart.clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<String, Order>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().await;
        orders.insert(order.id.0.clone(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.lock().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn find_by_session_ref(
        &self,
        session_ref: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.lock().await;
        Ok(orders
            .values()
            .find(|order| order.payment_session_ref.as_deref() == Some(session_ref))
            .cloned())
    }

    async fn set_session_ref(
        &self,
        id: &OrderId,
        session_ref: &str,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders.get_mut(&id.0) {
            order.payment_session_ref = Some(session_ref.to_string());
        }
        Ok(())
    }

    async fn transition_if_pending(
        &self,
        id: &OrderId,
        next: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        // Check-then-act stays atomic because both happen under one lock.
        let mut orders = self.orders.lock().await;
        match orders.get_mut(&id.0) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().await;
        orders.remove(&id.0);
        Ok(())
    }
}

pub struct InMemoryEventLogRepository {
    catalog: Arc<InMemoryCatalogRepository>,
    events: Mutex<Vec<(Identity, MenuItemId, EventKind)>>,
}

impl InMemoryEventLogRepository {
    pub fn new(catalog: Arc<InMemoryCatalogRepository>) -> Self {
        Self { catalog, events: Mutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl EventLogRepository for InMemoryEventLogRepository {
    async fn record(
        &self,
        identity: &Identity,
        item_id: MenuItemId,
        kind: EventKind,
    ) -> Result<(), RepositoryError> {
        let mut events = self.events.lock().await;
        events.push((identity.clone(), item_id, kind));
        Ok(())
    }

    async fn top_tags(
        &self,
        identity: &Identity,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError> {
        let item_ids: Vec<MenuItemId> = {
            let events = self.events.lock().await;
            events
                .iter()
                .filter(|(owner, _, _)| owner == identity)
                .map(|(_, item_id, _)| *item_id)
                .collect()
        };

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for item_id in item_ids {
            if let Some(item) = self.catalog.get(item_id).await? {
                for tag in item.tags {
                    *counts.entry(tag.to_lowercase()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(limit).map(|(tag, _)| tag).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use tably_core::domain::identity::{GuestToken, Identity, UserId};
    use tably_core::domain::menu::{MenuItem, MenuItemId};

    use crate::repositories::{
        CartStore, CatalogRepository, EventKind, EventLogRepository, InMemoryCartStore,
        InMemoryCatalogRepository, InMemoryEventLogRepository,
    };

    fn item(id: i64, tags: &[&str]) -> MenuItem {
        MenuItem {
            id: MenuItemId(id),
            name: format!("item-{id}"),
            description: String::new(),
            price: Decimal::new(950, 2),
            is_available: true,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            popularity: 5,
        }
    }

    #[tokio::test]
    async fn resolve_returns_the_same_cart_per_identity() {
        let store = InMemoryCartStore::default();
        let guest = Identity::Guest(GuestToken("tok-1".to_string()));

        let first = store.resolve(&guest).await.expect("first resolve");
        let second = store.resolve(&guest).await.expect("second resolve");
        assert_eq!(first.id, second.id);

        let user = Identity::User(UserId("u-1".to_string()));
        let third = store.resolve(&user).await.expect("user resolve");
        assert_ne!(first.id, third.id);
    }

    #[tokio::test]
    async fn concurrent_adds_of_the_same_item_both_land() {
        let store = Arc::new(InMemoryCartStore::default());
        let guest = Identity::Guest(GuestToken("tok-2".to_string()));
        let cart = store.resolve(&guest).await.expect("resolve cart");

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = Arc::clone(&store);
            let cart_id = cart.id.clone();
            handles.push(tokio::spawn(async move {
                store.add_line(&cart_id, MenuItemId(7), 1).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("add line");
        }

        let cart = store.find_by_id(&cart.id).await.expect("find").expect("cart exists");
        assert_eq!(cart.line(MenuItemId(7)).map(|l| l.quantity), Some(2));
    }

    #[tokio::test]
    async fn top_tags_count_across_recorded_events() {
        let catalog = Arc::new(InMemoryCatalogRepository::default());
        catalog.upsert(item(1, &["spicy", "thai"])).await.expect("seed 1");
        catalog.upsert(item(2, &["spicy", "noodles"])).await.expect("seed 2");
        let events = InMemoryEventLogRepository::new(Arc::clone(&catalog));

        let user = Identity::User(UserId("u-9".to_string()));
        events.record(&user, MenuItemId(1), EventKind::Add).await.expect("record");
        events.record(&user, MenuItemId(2), EventKind::Purchase).await.expect("record");

        let tags = events.top_tags(&user, 2).await.expect("top tags");
        assert_eq!(tags, vec!["spicy".to_string(), "noodles".to_string()]);
    }

    #[tokio::test]
    async fn top_tags_for_unknown_identity_is_empty() {
        let catalog = Arc::new(InMemoryCatalogRepository::default());
        let events = InMemoryEventLogRepository::new(catalog);
        let guest = Identity::Guest(GuestToken("nobody".to_string()));
        assert!(events.top_tags(&guest, 5).await.expect("top tags").is_empty());
    }
}
