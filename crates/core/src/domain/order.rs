use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::cart::CartId;
use crate::domain::identity::UserId;
use crate::domain::menu::MenuItemId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// A priced line frozen at checkout time. Later cart mutations never reach
/// an existing order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
    pub unit_price_minor: i64,
}

impl OrderLine {
    pub fn total_minor(&self) -> i64 {
        self.unit_price_minor.saturating_mul(i64::from(self.quantity))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: UserId,
    pub cart_id: CartId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub total_minor: i64,
    pub payment_session_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Created in `Pending` from a cart snapshot, before any payment session
    /// is requested.
    pub fn pending(
        owner: UserId,
        cart_id: CartId,
        lines: Vec<OrderLine>,
    ) -> Result<Self, DomainError> {
        let total_minor = lines.iter().map(OrderLine::total_minor).sum();
        let order = Self {
            id: OrderId::new(),
            owner,
            cart_id,
            status: OrderStatus::Pending,
            lines,
            total_minor,
            payment_session_ref: None,
            created_at: Utc::now(),
        };
        order.check_invariants()?;
        Ok(order)
    }

    /// Terminal states have no exits; everything else goes through here.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Failed)
                | (OrderStatus::Pending, OrderStatus::Canceled)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }
        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }

    /// A negative total is corrupted data, never something to repair.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.total_minor < 0 {
            return Err(DomainError::InvariantViolation(format!(
                "order {} has negative total {}",
                self.id.0, self.total_minor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::cart::CartId;
    use crate::domain::identity::UserId;
    use crate::domain::menu::MenuItemId;
    use crate::errors::DomainError;

    use super::{Order, OrderLine, OrderStatus};

    fn order() -> Order {
        Order::pending(
            UserId("u-1".to_string()),
            CartId("c-1".to_string()),
            vec![OrderLine {
                item_id: MenuItemId(3),
                name: "Pad Thai".to_string(),
                quantity: 2,
                unit_price_minor: 1150,
            }],
        )
        .expect("pending order")
    }

    #[test]
    fn total_is_fixed_from_snapshot() {
        assert_eq!(order().total_minor, 2300);
    }

    #[test]
    fn pending_reaches_each_terminal_state_once() {
        for terminal in [OrderStatus::Paid, OrderStatus::Failed, OrderStatus::Canceled] {
            let mut order = order();
            order.transition_to(terminal).expect("pending -> terminal");
            assert_eq!(order.status, terminal);
        }
    }

    #[test]
    fn paid_is_terminal() {
        let mut order = order();
        order.transition_to(OrderStatus::Paid).expect("pending -> paid");
        let error = order.transition_to(OrderStatus::Canceled).expect_err("paid is terminal");
        assert!(matches!(error, DomainError::InvalidOrderTransition { .. }));
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in
            [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Failed, OrderStatus::Canceled]
        {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }
}
