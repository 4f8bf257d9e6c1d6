//! Settlement calculator.
//!
//! A leader pays up front at the price tier of the friend count they promised.
//! When the group closes with fewer paid friends than promised, the leader
//! owes the difference between the actual-tier and expected-tier price across
//! their line items. This module computes that difference, stamps it on the
//! group, and drives the state transitions out of `Forming`.
//!
//! Everything for one group happens inside a single transaction: one batch
//! read, an in-memory computation, then writes only for fields that actually
//! changed. Re-running with no intervening order changes is a no-op, which is
//! what lets the sweeper and API-triggered recomputation race safely.

pub mod payment;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};

use crate::domain::basket::BasketSnapshot;
use crate::domain::group::{GroupOrder, GroupStatus};
use crate::domain::order::{Order, OrderItem, OrderStatus};
use crate::domain::pricing::{PriceLadder, Product};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SettlementOutcome {
    pub group_id: i64,
    pub actual_friends: i64,
    pub expected_friends: i64,
    pub settlement_required: bool,
    pub settlement_amount: i64,
    /// Whether this run wrote anything. False on a repeat run with no
    /// intervening order changes.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    Finalized {
        status: GroupStatus,
        settlement: SettlementOutcome,
    },
    /// Leader never paid before expiry; nothing to settle.
    Expired { group_id: i64 },
    /// The group had already left `Forming`.
    AlreadyClosed { status: GroupStatus },
}

/// Recompute the settlement fields for one group.
///
/// No-ops (without error) when the leader order is missing or carries no
/// payment evidence: nothing is owed yet. Unknown groups are a not-found
/// error for the caller to surface.
pub async fn recompute(
    pool: &SqlitePool,
    group_id: i64,
    now: DateTime<Utc>,
) -> Result<SettlementOutcome> {
    let mut tx = pool.begin().await?;
    let Some(view) = load_view(&mut tx, group_id).await? else {
        return Err(AppError::GroupNotFound(group_id));
    };
    let comp = compute(&view);
    let mut outcome = comp.outcome(group_id);
    if comp.leader_paid {
        outcome.changed = apply(&mut tx, &view, &comp, now).await?;
        tx.commit().await?;
    }
    Ok(outcome)
}

/// Close a group's formation window regardless of participation, picking
/// `FinalizedSuccess` or `FinalizedShort` from the actual friend count. A
/// group whose leader never paid expires instead.
pub async fn finalize(
    pool: &SqlitePool,
    group_id: i64,
    now: DateTime<Utc>,
) -> Result<FinalizeOutcome> {
    let mut tx = pool.begin().await?;
    let Some(view) = load_view(&mut tx, group_id).await? else {
        return Err(AppError::GroupNotFound(group_id));
    };
    if view.group.status != GroupStatus::Forming {
        return Ok(FinalizeOutcome::AlreadyClosed {
            status: view.group.status,
        });
    }
    let comp = compute(&view);
    close_group(tx, &view, &comp, now).await
}

/// Early finalize: close the group as soon as the promised number of
/// friends have paid. Returns `None` when the group is still short, already
/// closed, or the leader has not paid.
pub async fn finalize_if_complete(
    pool: &SqlitePool,
    group_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<FinalizeOutcome>> {
    let mut tx = pool.begin().await?;
    let Some(view) = load_view(&mut tx, group_id).await? else {
        return Err(AppError::GroupNotFound(group_id));
    };
    if view.group.status != GroupStatus::Forming {
        return Ok(None);
    }
    let comp = compute(&view);
    if !comp.leader_paid || comp.actual_friends < comp.expected_friends {
        return Ok(None);
    }
    close_group(tx, &view, &comp, now).await.map(Some)
}

async fn close_group(
    mut tx: Transaction<'_, Sqlite>,
    view: &GroupView,
    comp: &Computation,
    now: DateTime<Utc>,
) -> Result<FinalizeOutcome> {
    let group_id = view.group.id;
    if !comp.leader_paid {
        sqlx::query("UPDATE group_orders SET status = ? WHERE id = ?")
            .bind(GroupStatus::Expired)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(group_id, "group expired; leader order was never paid");
        return Ok(FinalizeOutcome::Expired { group_id });
    }

    let status = if comp.actual_friends >= comp.expected_friends {
        GroupStatus::FinalizedSuccess
    } else {
        GroupStatus::FinalizedShort
    };
    sqlx::query("UPDATE group_orders SET status = ?, finalized_at = ? WHERE id = ?")
        .bind(status)
        .bind(now)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;
    apply(&mut tx, view, comp, now).await?;
    tx.commit().await?;

    let mut settlement = comp.outcome(group_id);
    settlement.changed = true;
    info!(
        group_id,
        status = ?status,
        actual = comp.actual_friends,
        expected = comp.expected_friends,
        settlement_amount = comp.settlement_amount,
        "group finalized"
    );
    Ok(FinalizeOutcome::Finalized { status, settlement })
}

/// Everything the calculator needs for one group, read in a single batch.
struct GroupView {
    group: GroupOrder,
    /// All non-settlement orders of the group, leader's included.
    orders: Vec<Order>,
    leader_items: Vec<OrderItem>,
    /// Frozen ladders from the basket snapshot, patched with live product
    /// rows where the snapshot has gaps.
    ladders: HashMap<i64, PriceLadder>,
}

impl GroupView {
    fn leader(&self) -> Option<&Order> {
        self.orders.iter().find(|o| o.user_id == self.group.leader_id)
    }
}

struct Computation {
    actual_friends: i64,
    expected_friends: i64,
    leader_paid: bool,
    settlement_required: bool,
    settlement_amount: i64,
}

impl Computation {
    fn outcome(&self, group_id: i64) -> SettlementOutcome {
        SettlementOutcome {
            group_id,
            actual_friends: self.actual_friends,
            expected_friends: self.expected_friends,
            settlement_required: self.settlement_required,
            settlement_amount: self.settlement_amount,
            changed: false,
        }
    }
}

async fn load_view(conn: &mut SqliteConnection, group_id: i64) -> Result<Option<GroupView>> {
    let Some(group) = sqlx::query_as::<_, GroupOrder>("SELECT * FROM group_orders WHERE id = ?")
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE group_order_id = ? AND is_settlement_payment = 0 ORDER BY id",
    )
    .bind(group_id)
    .fetch_all(&mut *conn)
    .await?;

    let leader_order_id = orders
        .iter()
        .find(|o| o.user_id == group.leader_id)
        .map(|o| o.id);
    let leader_items = match leader_order_id {
        Some(order_id) => {
            sqlx::query_as::<_, OrderItem>(
                "SELECT * FROM order_items WHERE order_id = ? ORDER BY id",
            )
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            warn!(group_id, "leader order missing; settlement cannot be computed");
            Vec::new()
        }
    };

    let snapshot = group.basket_snapshot.as_deref().and_then(|raw| {
        match BasketSnapshot::parse(raw) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!(group_id, %error, "malformed basket snapshot; falling back to live product rows");
                None
            }
        }
    });

    let mut ladders = HashMap::new();
    if let Some(snapshot) = &snapshot {
        for line in &snapshot.items {
            ladders.insert(line.product_id, line.ladder.clone());
        }
    }
    for item in &leader_items {
        if ladders.contains_key(&item.product_id) {
            continue;
        }
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(item.product_id)
            .fetch_optional(&mut *conn)
            .await?;
        match product {
            Some(product) => {
                ladders.insert(item.product_id, product.ladder());
            }
            None => warn!(
                group_id,
                product_id = item.product_id,
                "no snapshot line and no product row for leader item"
            ),
        }
    }

    Ok(Some(GroupView {
        group,
        orders,
        leader_items,
        ladders,
    }))
}

/// Pure settlement computation over a loaded view.
fn compute(view: &GroupView) -> Computation {
    let group = &view.group;
    let leader = view.leader();
    // Distinct users, so a duplicated order row cannot inflate the count.
    let actual_friends = view
        .orders
        .iter()
        .filter(|o| o.user_id != group.leader_id && o.has_payment_evidence())
        .map(|o| o.user_id)
        .collect::<HashSet<_>>()
        .len() as i64;
    let (expected_friends, _inferred) = group.resolve_expected_friends(leader);
    let leader_paid = leader.map(|o| o.has_payment_evidence()).unwrap_or(false);

    let mut comp = Computation {
        actual_friends,
        expected_friends,
        leader_paid,
        settlement_required: false,
        settlement_amount: 0,
    };
    if !leader_paid || actual_friends >= expected_friends {
        return comp;
    }

    let mut amount: i64 = 0;
    for item in &view.leader_items {
        let Some(ladder) = view.ladders.get(&item.product_id) else {
            warn!(
                group_id = group.id,
                product_id = item.product_id,
                "no price ladder for leader item; line skipped"
            );
            continue;
        };
        let actual_price = ladder.price_for_tier(actual_friends);
        let expected_price = ladder.price_for_tier(expected_friends);
        if actual_price == 0 || expected_price == 0 {
            warn!(
                group_id = group.id,
                product_id = item.product_id,
                "resolved a zero tier price; product pricing is incomplete"
            );
        }
        amount = amount.saturating_add((actual_price - expected_price).saturating_mul(item.quantity));
    }
    if amount < 0 {
        warn!(
            group_id = group.id,
            amount, "negative settlement delta; ladder is not monotonic"
        );
        amount = 0;
    }
    comp.settlement_amount = amount;
    comp.settlement_required = amount > 0;
    comp
}

/// Persist the computation, writing only what differs from the stored row.
/// Also keeps the leader order's status in step with whether settlement is
/// owed.
async fn apply(
    conn: &mut SqliteConnection,
    view: &GroupView,
    comp: &Computation,
    now: DateTime<Utc>,
) -> Result<bool> {
    let group = &view.group;
    let mut changed = false;

    if group.settlement_required != comp.settlement_required
        || group.settlement_amount != comp.settlement_amount
        || group.expected_friends != Some(comp.expected_friends)
    {
        sqlx::query(
            "UPDATE group_orders SET settlement_required = ?, settlement_amount = ?, expected_friends = ? WHERE id = ?",
        )
        .bind(comp.settlement_required)
        .bind(comp.settlement_amount)
        .bind(comp.expected_friends)
        .bind(group.id)
        .execute(&mut *conn)
        .await?;
        changed = true;
    }

    if let Some(leader) = view.leader() {
        let next = if comp.settlement_required && leader.status != OrderStatus::PendingSettlement {
            Some(OrderStatus::PendingSettlement)
        } else if !comp.settlement_required && leader.status == OrderStatus::PendingSettlement {
            Some(OrderStatus::Completed)
        } else {
            None
        };
        if let Some(status) = next {
            sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status)
                .bind(now)
                .bind(leader.id)
                .execute(&mut *conn)
                .await?;
            changed = true;
        }
    }

    Ok(changed)
}
