//! Domain model for the group-buy settlement core.

pub mod basket;
pub mod events;
pub mod group;
pub mod order;
pub mod pricing;

pub use basket::{BasketLine, BasketSnapshot};
pub use events::GroupEvent;
pub use group::{GroupOrder, GroupStatus, DEFAULT_EXPECTED_FRIENDS};
pub use order::{Order, OrderItem, OrderKind, OrderStatus};
pub use pricing::{PriceLadder, Product};
