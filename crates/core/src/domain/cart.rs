use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::Identity;
use crate::domain::menu::MenuItemId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartId(pub String);

impl CartId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CartId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: MenuItemId,
    pub quantity: u32,
}

/// One cart per identity, created lazily on first touch and cleared when a
/// checkout succeeds. Lines keep insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: Identity,
    pub lines: Vec<CartLine>,
    pub created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: Identity) -> Self {
        Self { id: CartId::new(), owner, lines: Vec::new(), created_at: Utc::now() }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, item_id: MenuItemId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.item_id == item_id)
    }

    /// Increment an existing line or append a new one.
    pub fn apply_add(&mut self, item_id: MenuItemId, quantity: u32) {
        if let Some(line) = self.lines.iter_mut().find(|line| line.item_id == item_id) {
            line.quantity = line.quantity.saturating_add(quantity);
            return;
        }
        self.lines.push(CartLine { item_id, quantity });
    }

    /// Removing an absent line is a no-op, not an error.
    pub fn apply_remove(&mut self, item_id: MenuItemId) {
        self.lines.retain(|line| line.item_id != item_id);
    }

    /// Overwrite a line's quantity; zero or below deletes the line.
    pub fn set_quantity(&mut self, item_id: MenuItemId, quantity: i64) {
        if quantity <= 0 {
            self.apply_remove(item_id);
            return;
        }
        let clamped = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.lines.iter_mut().find(|line| line.item_id == item_id) {
            line.quantity = clamped;
        } else {
            self.lines.push(CartLine { item_id, quantity: clamped });
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::identity::{GuestToken, Identity};
    use crate::domain::menu::MenuItemId;

    use super::Cart;

    fn cart() -> Cart {
        Cart::new(Identity::Guest(GuestToken("tok".to_string())))
    }

    #[test]
    fn add_merges_quantities_for_same_item() {
        let mut cart = cart();
        cart.apply_add(MenuItemId(7), 1);
        cart.apply_add(MenuItemId(7), 2);
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.line(MenuItemId(7)).map(|l| l.quantity), Some(3));
    }

    #[test]
    fn add_preserves_insertion_order() {
        let mut cart = cart();
        cart.apply_add(MenuItemId(5), 1);
        cart.apply_add(MenuItemId(3), 1);
        cart.apply_add(MenuItemId(5), 1);
        let ids: Vec<i64> = cart.lines.iter().map(|l| l.item_id.0).collect();
        assert_eq!(ids, vec![5, 3]);
    }

    #[test]
    fn remove_of_absent_line_is_noop() {
        let mut cart = cart();
        cart.apply_add(MenuItemId(1), 1);
        cart.apply_remove(MenuItemId(99));
        assert_eq!(cart.lines.len(), 1);
    }

    #[test]
    fn zero_quantity_deletes_the_line() {
        let mut cart = cart();
        cart.apply_add(MenuItemId(1), 2);
        cart.set_quantity(MenuItemId(1), 0);
        assert!(cart.is_empty());

        cart.apply_add(MenuItemId(2), 1);
        cart.set_quantity(MenuItemId(2), 4);
        assert_eq!(cart.line(MenuItemId(2)).map(|l| l.quantity), Some(4));
    }
}
