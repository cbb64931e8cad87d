pub mod cart;
pub mod identity;
pub mod menu;
pub mod order;
