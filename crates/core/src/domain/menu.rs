use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MenuItemId(pub i64);

/// Catalog item as read from the external catalog. The core never writes
/// these; availability, tags, and popularity are owned by the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub is_available: bool,
    pub tags: Vec<String>,
    pub popularity: u32,
}

impl MenuItem {
    /// Price in minor units (cents), the unit orders and payment sessions
    /// are denominated in.
    pub fn price_minor(&self) -> i64 {
        (self.price * Decimal::from(100)).round().to_i64().unwrap_or_default()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate.eq_ignore_ascii_case(tag))
    }
}
