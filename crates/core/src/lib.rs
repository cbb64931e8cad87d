pub mod config;
pub mod domain;
pub mod errors;
pub mod prefs;
pub mod rank;
pub mod search;

pub use chrono;

pub use domain::cart::{Cart, CartId, CartLine};
pub use domain::identity::{GuestToken, Identity, RequestContext, UserId};
pub use domain::menu::{MenuItem, MenuItemId};
pub use domain::order::{Order, OrderId, OrderLine, OrderStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use prefs::{Facet, Intent, ItemRef, PreferenceSet, Vocabulary};
pub use rank::DEFAULT_SUGGESTION_LIMIT;
