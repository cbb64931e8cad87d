//! Contract tests for the SQL repositories against a real SQLite file.

use std::sync::Arc;

use tempfile::TempDir;

use tably_core::domain::identity::{GuestToken, Identity, UserId};
use tably_core::domain::menu::MenuItemId;
use tably_core::domain::order::{Order, OrderLine, OrderStatus};
use tably_db::fixtures::seed_demo_menu;
use tably_db::repositories::{
    SqlCartStore, SqlCatalogRepository, SqlEventLogRepository, SqlOrderRepository,
};
use tably_db::{connect, CartStore, CatalogRepository, DbPool, EventKind, EventLogRepository,
    OrderRepository};

async fn test_pool() -> (TempDir, DbPool) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("tably-test.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = connect(&url).await.expect("connect test db");
    tably_db::migrations::run_pending(&pool).await.expect("run migrations");
    (dir, pool)
}

#[tokio::test]
async fn seeded_catalog_round_trips_tags_and_prices() {
    let (_dir, pool) = test_pool().await;
    let catalog = SqlCatalogRepository::new(pool);

    let count = seed_demo_menu(&catalog).await.expect("seed demo menu");
    assert_eq!(count, 27);

    let pad_thai = catalog
        .get(MenuItemId(1))
        .await
        .expect("fetch item")
        .expect("item 1 seeded");
    assert_eq!(pad_thai.name, "Spicy Vegan Pad Thai");
    assert_eq!(pad_thai.price_minor(), 1250);
    assert!(pad_thai.has_tag("vegan"));
    assert!(pad_thai.has_tag("spicy"));

    let available = catalog.list_available().await.expect("list available");
    assert_eq!(available.len(), 27);
}

#[tokio::test]
async fn resolve_is_stable_per_identity_and_isolated_between_them() {
    let (_dir, pool) = test_pool().await;
    let carts = SqlCartStore::new(pool);

    let user = Identity::User(UserId("u-1".to_string()));
    let guest = Identity::Guest(GuestToken("tok-abc".to_string()));

    let first = carts.resolve(&user).await.expect("resolve user cart");
    let again = carts.resolve(&user).await.expect("resolve user cart again");
    assert_eq!(first.id, again.id);

    let other = carts.resolve(&guest).await.expect("resolve guest cart");
    assert_ne!(first.id, other.id);
    assert_eq!(other.owner, guest);
}

#[tokio::test]
async fn concurrent_adds_of_the_same_item_sum_their_quantities() {
    let (_dir, pool) = test_pool().await;
    let carts = Arc::new(SqlCartStore::new(pool));

    let guest = Identity::Guest(GuestToken("tok-race".to_string()));
    let cart = carts.resolve(&guest).await.expect("resolve cart");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let carts = Arc::clone(&carts);
        let cart_id = cart.id.clone();
        handles.push(tokio::spawn(async move {
            carts.add_line(&cart_id, MenuItemId(42), 1).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("add line");
    }

    let cart = carts
        .find_by_id(&cart.id)
        .await
        .expect("reload cart")
        .expect("cart exists");
    assert_eq!(cart.line(MenuItemId(42)).map(|line| line.quantity), Some(4));
}

#[tokio::test]
async fn set_quantity_overwrites_and_zero_deletes() {
    let (_dir, pool) = test_pool().await;
    let carts = SqlCartStore::new(pool);

    let guest = Identity::Guest(GuestToken("tok-qty".to_string()));
    let cart = carts.resolve(&guest).await.expect("resolve cart");

    carts.add_line(&cart.id, MenuItemId(5), 2).await.expect("add");
    carts.set_line_quantity(&cart.id, MenuItemId(5), 7).await.expect("set");
    let reloaded = carts.find_by_id(&cart.id).await.expect("find").expect("exists");
    assert_eq!(reloaded.line(MenuItemId(5)).map(|line| line.quantity), Some(7));

    carts.set_line_quantity(&cart.id, MenuItemId(5), 0).await.expect("zero");
    let reloaded = carts.find_by_id(&cart.id).await.expect("find").expect("exists");
    assert!(reloaded.is_empty());
}

#[tokio::test]
async fn order_status_compare_and_set_admits_exactly_one_winner() {
    let (_dir, pool) = test_pool().await;
    let orders = Arc::new(SqlOrderRepository::new(pool));

    let order = Order::pending(
        UserId("u-cas".to_string()),
        tably_core::domain::cart::CartId("cart-cas".to_string()),
        vec![OrderLine {
            item_id: MenuItemId(1),
            name: "Spicy Vegan Pad Thai".to_string(),
            quantity: 2,
            unit_price_minor: 1250,
        }],
    )
    .expect("build pending order");
    orders.insert(&order).await.expect("insert order");

    let mut handles = Vec::new();
    for _ in 0..3 {
        let orders = Arc::clone(&orders);
        let id = order.id.clone();
        handles.push(tokio::spawn(async move {
            orders.transition_if_pending(&id, OrderStatus::Paid).await
        }));
    }
    let mut wins = 0;
    for handle in handles {
        if handle.await.expect("join").expect("cas") {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let reloaded = orders
        .find_by_id(&order.id)
        .await
        .expect("reload")
        .expect("order exists");
    assert_eq!(reloaded.status, OrderStatus::Paid);
    assert_eq!(reloaded.total_minor, 2500);

    // A paid order never moves again.
    let moved = orders
        .transition_if_pending(&order.id, OrderStatus::Failed)
        .await
        .expect("cas after paid");
    assert!(!moved);
}

#[tokio::test]
async fn session_ref_lookup_finds_the_order() {
    let (_dir, pool) = test_pool().await;
    let orders = SqlOrderRepository::new(pool);

    let order = Order::pending(
        UserId("u-ref".to_string()),
        tably_core::domain::cart::CartId("cart-ref".to_string()),
        vec![OrderLine {
            item_id: MenuItemId(2),
            name: "Chili Miso Ramen".to_string(),
            quantity: 1,
            unit_price_minor: 1300,
        }],
    )
    .expect("build pending order");
    orders.insert(&order).await.expect("insert");
    orders.set_session_ref(&order.id, "sess_123").await.expect("set session ref");

    let found = orders
        .find_by_session_ref("sess_123")
        .await
        .expect("lookup")
        .expect("order by session ref");
    assert_eq!(found.id, order.id);
    assert_eq!(found.payment_session_ref.as_deref(), Some("sess_123"));

    assert!(orders
        .find_by_session_ref("sess_unknown")
        .await
        .expect("lookup unknown")
        .is_none());
}

#[tokio::test]
async fn event_history_surfaces_the_identitys_frequent_tags() {
    let (_dir, pool) = test_pool().await;
    let catalog = SqlCatalogRepository::new(pool.clone());
    seed_demo_menu(&catalog).await.expect("seed demo menu");
    let events = SqlEventLogRepository::new(pool);

    let user = Identity::User(UserId("u-tags".to_string()));
    // Pad Thai (thai, vegan, spicy, noodles) and Buddha Bowl (vegan, spicy, ...).
    events.record(&user, MenuItemId(1), EventKind::Add).await.expect("record");
    events.record(&user, MenuItemId(9), EventKind::Purchase).await.expect("record");

    let tags = events.top_tags(&user, 2).await.expect("top tags");
    assert_eq!(tags, vec!["spicy".to_string(), "vegan".to_string()]);

    let stranger = Identity::Guest(GuestToken("tok-none".to_string()));
    assert!(events.top_tags(&stranger, 5).await.expect("empty history").is_empty());
}
