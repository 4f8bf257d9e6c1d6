//! Tiered friend pricing.
//!
//! Every product carries a price ladder: the solo (market) price and up to
//! three friend-tier prices. Settlement math only ever sees a ladder frozen
//! into a basket snapshot, never the live product row, so admin price edits
//! cannot retroactively change what a leader committed to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Catalog row. Only the price columns matter to settlement; everything else
/// lives in the storefront service.
#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub base_price: i64,
    pub market_price: i64,
    pub friend_1_price: Option<i64>,
    pub friend_2_price: Option<i64>,
    pub friend_3_price: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn ladder(&self) -> PriceLadder {
        PriceLadder {
            market_price: self.market_price,
            friend_1_price: self.friend_1_price,
            friend_2_price: self.friend_2_price,
            friend_3_price: self.friend_3_price,
        }
    }
}

/// Per-product tier prices, assumed monotonically non-increasing as the
/// friend count rises. Not enforced at write time; the fallback chain in
/// [`PriceLadder::price_for_tier`] tolerates gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLadder {
    pub market_price: i64,
    pub friend_1_price: Option<i64>,
    pub friend_2_price: Option<i64>,
    pub friend_3_price: Option<i64>,
}

impl PriceLadder {
    /// Unit price when `friend_count` friends have joined.
    ///
    /// Each tier falls back through the tiers below it down to the market
    /// price. A result of 0 means the market price itself is unset, which
    /// callers must treat as a data-integrity problem rather than a price.
    pub fn price_for_tier(&self, friend_count: i64) -> i64 {
        let market = self.market_price.max(0);
        let f1 = positive(self.friend_1_price);
        let f2 = positive(self.friend_2_price);
        let f3 = positive(self.friend_3_price);
        match friend_count {
            n if n <= 0 => market,
            1 => f1.unwrap_or(market),
            2 => f2.or(f1).unwrap_or(market),
            _ => f3.or(f2).or(f1).unwrap_or(market),
        }
    }
}

fn positive(value: Option<i64>) -> Option<i64> {
    value.filter(|p| *p > 0)
}
