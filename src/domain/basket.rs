//! Versioned basket snapshot.
//!
//! Captured once at group creation and stored in
//! `group_orders.basket_snapshot`. The full price ladder is frozen per line
//! so settlement never has to consult the live product row.

use serde::{Deserialize, Serialize};

use crate::domain::pricing::PriceLadder;

pub const BASKET_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketSnapshot {
    pub version: u32,
    pub items: Vec<BasketLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketLine {
    pub product_id: i64,
    pub quantity: i64,
    /// Price the leader was actually charged per unit.
    pub unit_price: i64,
    /// Solo price at snapshot time, kept for display.
    pub solo_price: i64,
    pub ladder: PriceLadder,
}

impl BasketSnapshot {
    pub fn new(items: Vec<BasketLine>) -> Self {
        Self {
            version: BASKET_SNAPSHOT_VERSION,
            items,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn ladder_for(&self, product_id: i64) -> Option<&PriceLadder> {
        self.items
            .iter()
            .find(|line| line.product_id == product_id)
            .map(|line| &line.ladder)
    }

    pub fn total(&self) -> i64 {
        self.items
            .iter()
            .map(|line| line.unit_price.saturating_mul(line.quantity))
            .sum()
    }
}
