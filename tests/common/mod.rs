//! Shared fixtures for the integration suite: an in-memory database with the
//! real migrations, row seeding helpers, and a mock payment gateway.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use bahamm_settlement::domain::basket::{BasketLine, BasketSnapshot};
use bahamm_settlement::domain::group::GroupOrder;
use bahamm_settlement::domain::order::Order;
use bahamm_settlement::domain::pricing::PriceLadder;
use bahamm_settlement::gateway::{ChargeSession, GatewayError, PaymentGateway, VerifiedPayment};

pub async fn test_pool() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
    pool
}

pub fn ladder() -> PriceLadder {
    PriceLadder {
        market_price: 100,
        friend_1_price: Some(80),
        friend_2_price: Some(60),
        friend_3_price: Some(50),
    }
}

pub fn snapshot_for(product_id: i64, quantity: i64, ladder: PriceLadder) -> BasketSnapshot {
    let unit_price = ladder.price_for_tier(2);
    let solo_price = ladder.market_price;
    BasketSnapshot::new(vec![BasketLine {
        product_id,
        quantity,
        unit_price,
        solo_price,
        ladder,
    }])
}

pub async fn seed_product(pool: &SqlitePool, l: &PriceLadder) -> i64 {
    let now = Utc::now();
    sqlx::query_scalar(
        "INSERT INTO products (name, base_price, market_price, friend_1_price, friend_2_price, \
         friend_3_price, created_at, updated_at) VALUES (?, 0, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind("rice 10kg")
    .bind(l.market_price)
    .bind(l.friend_1_price)
    .bind(l.friend_2_price)
    .bind(l.friend_3_price)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .expect("seed product")
}

/// Seed a product under a caller-chosen id so item fixtures can reference
/// it without threading generated ids around.
pub async fn seed_product_with_id(pool: &SqlitePool, id: i64, l: &PriceLadder) {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO products (id, name, base_price, market_price, friend_1_price, \
         friend_2_price, friend_3_price, created_at, updated_at) VALUES (?, ?, 0, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind("rice 10kg")
    .bind(l.market_price)
    .bind(l.friend_1_price)
    .bind(l.friend_2_price)
    .bind(l.friend_3_price)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("seed product");
}

pub struct GroupSeed {
    pub leader_id: i64,
    pub expected_friends: Option<i64>,
    pub max_friends: i64,
    /// Negative means already expired.
    pub expires_in_minutes: i64,
    pub snapshot: Option<BasketSnapshot>,
}

impl Default for GroupSeed {
    fn default() -> Self {
        Self {
            leader_id: 10,
            expected_friends: Some(2),
            max_friends: 3,
            expires_in_minutes: 60,
            snapshot: None,
        }
    }
}

pub async fn seed_group(pool: &SqlitePool, seed: &GroupSeed) -> i64 {
    let now = Utc::now();
    let snapshot_json = seed
        .snapshot
        .as_ref()
        .map(|s| s.to_json().expect("snapshot json"));
    sqlx::query_scalar(
        "INSERT INTO group_orders (leader_id, invite_token, status, created_at, expires_at, \
         basket_snapshot, expected_friends, max_friends) \
         VALUES (?, ?, 'forming', ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(seed.leader_id)
    .bind(Uuid::new_v4().to_string())
    .bind(now)
    .bind(now + Duration::minutes(seed.expires_in_minutes))
    .bind(snapshot_json)
    .bind(seed.expected_friends)
    .bind(seed.max_friends)
    .fetch_one(pool)
    .await
    .expect("seed group")
}

/// Which single payment signal a seeded order carries.
pub enum Paid {
    No,
    RefId,
    PaidAt,
    /// Legacy Persian completed label, exercised through the status shim.
    StatusPersian,
    StatusEnglish,
}

pub async fn seed_order(
    pool: &SqlitePool,
    group_id: i64,
    user_id: i64,
    paid: Paid,
    delivery_slot: Option<&str>,
) -> i64 {
    let now = Utc::now();
    let (ref_id, paid_at, status): (Option<&str>, Option<DateTime<Utc>>, &str) = match paid {
        Paid::No => (None, None, "pending"),
        Paid::RefId => (Some("REF-777"), None, "pending"),
        Paid::PaidAt => (None, Some(now), "pending"),
        Paid::StatusPersian => (None, None, "تکمیل شده"),
        Paid::StatusEnglish => (None, None, "completed"),
    };
    sqlx::query_scalar(
        "INSERT INTO orders (user_id, group_order_id, order_type, status, is_settlement_payment, \
         payment_ref_id, paid_at, delivery_slot, total_amount, created_at, updated_at) \
         VALUES (?, ?, 'group', ?, 0, ?, ?, ?, 0, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(group_id)
    .bind(status)
    .bind(ref_id)
    .bind(paid_at)
    .bind(delivery_slot)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .expect("seed order")
}

pub async fn seed_item(pool: &SqlitePool, order_id: i64, product_id: i64, quantity: i64, unit_price: i64) {
    sqlx::query("INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES (?, ?, ?, ?)")
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price)
        .execute(pool)
        .await
        .expect("seed item");
}

pub async fn get_group(pool: &SqlitePool, id: i64) -> GroupOrder {
    sqlx::query_as("SELECT * FROM group_orders WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("group row")
}

pub async fn get_order(pool: &SqlitePool, id: i64) -> Order {
    sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("order row")
}

#[derive(Default)]
pub struct MockGateway {
    pub request_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub reject_verify: AtomicBool,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn request_payment(
        &self,
        _amount: i64,
        _description: &str,
        _callback_url: &str,
    ) -> Result<ChargeSession, GatewayError> {
        let n = self.request_calls.fetch_add(1, Ordering::SeqCst);
        let authority = format!("A-{n:06}");
        Ok(ChargeSession {
            payment_url: format!("https://gateway.test/start/{authority}"),
            authority,
        })
    }

    async fn verify_payment(
        &self,
        _authority: &str,
        _amount: i64,
    ) -> Result<VerifiedPayment, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_verify.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected(-21));
        }
        Ok(VerifiedPayment {
            ref_id: "900123".into(),
        })
    }
}
