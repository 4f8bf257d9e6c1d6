//! Settlement payment workflow.
//!
//! When a group closes short, the leader owes `settlement_amount`. This
//! module creates the follow-up charge through the payment gateway and
//! applies the verified result exactly once. The gateway call happens outside
//! any transaction; a sqlite write lock must not wait on the network.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::domain::group::GroupOrder;
use crate::domain::order::{Order, OrderKind, OrderStatus};
use crate::error::{AppError, Result};
use crate::gateway::PaymentGateway;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PaymentSession {
    pub order_id: i64,
    pub group_id: i64,
    pub amount: i64,
    pub authority: String,
    pub payment_url: String,
}

#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Settled { group_id: i64, ref_id: String },
    /// Duplicate callback for a group that is already settled; nothing was
    /// charged or changed.
    AlreadySettled { group_id: i64 },
}

/// Open a gateway charge session for a group's outstanding settlement and
/// record it as a settlement-only order.
pub async fn initiate(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    callback_url: &str,
    group_id: i64,
    now: DateTime<Utc>,
) -> Result<PaymentSession> {
    let group = fetch_group(pool, group_id).await?;
    if !group.settlement_required || group.settlement_amount <= 0 {
        return Err(AppError::invalid_state("no settlement is owed for this group"));
    }
    if group.settlement_paid_at.is_some() {
        return Err(AppError::invalid_state("settlement has already been paid"));
    }

    let description = format!("تسویه حساب خرید گروهی {group_id}");
    let session = gateway
        .request_payment(group.settlement_amount, &description, callback_url)
        .await?;

    let order_id: i64 = sqlx::query_scalar(
        "INSERT INTO orders (user_id, group_order_id, order_type, status, is_settlement_payment, \
         payment_authority, total_amount, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?) RETURNING id",
    )
    .bind(group.leader_id)
    .bind(group_id)
    .bind(OrderKind::Group)
    .bind(OrderStatus::Pending)
    .bind(&session.authority)
    .bind(group.settlement_amount)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    info!(
        group_id,
        order_id,
        amount = group.settlement_amount,
        authority = %session.authority,
        "settlement payment initiated"
    );
    Ok(PaymentSession {
        order_id,
        group_id,
        amount: group.settlement_amount,
        authority: session.authority,
        payment_url: session.payment_url,
    })
}

/// Apply a verified settlement payment callback.
///
/// Idempotent: once `settlement_paid_at` is stamped, further callbacks for
/// the same group return [`VerifyOutcome::AlreadySettled`] without touching
/// the gateway or the database.
pub async fn verify(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    authority: &str,
    now: DateTime<Utc>,
) -> Result<VerifyOutcome> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE payment_authority = ? AND is_settlement_payment = 1",
    )
    .bind(authority)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::OrderNotFound)?;

    let group_id = order
        .group_order_id
        .ok_or_else(|| AppError::invalid_state("settlement order has no group"))?;
    let group = fetch_group(pool, group_id).await?;
    if group.settlement_paid_at.is_some() {
        info!(group_id, authority, "duplicate settlement verification ignored");
        return Ok(VerifyOutcome::AlreadySettled { group_id });
    }

    let verified = gateway.verify_payment(authority, order.total_amount).await?;

    let mut tx = pool.begin().await?;
    // Conditional stamp settles the race between concurrent callbacks: only
    // the first one past this point applies the payment.
    let stamped = sqlx::query(
        "UPDATE group_orders SET settlement_paid_at = ? WHERE id = ? AND settlement_paid_at IS NULL",
    )
    .bind(now)
    .bind(group_id)
    .execute(&mut *tx)
    .await?;
    if stamped.rows_affected() == 0 {
        info!(group_id, authority, "settlement already applied by a concurrent verification");
        return Ok(VerifyOutcome::AlreadySettled { group_id });
    }
    sqlx::query(
        "UPDATE orders SET status = ?, payment_ref_id = ?, paid_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(OrderStatus::Completed)
    .bind(&verified.ref_id)
    .bind(now)
    .bind(now)
    .bind(order.id)
    .execute(&mut *tx)
    .await?;
    // Release the leader's original order from the pending-settlement hold.
    sqlx::query(
        "UPDATE orders SET status = ?, updated_at = ? \
         WHERE group_order_id = ? AND user_id = ? AND is_settlement_payment = 0 AND status = ?",
    )
    .bind(OrderStatus::Completed)
    .bind(now)
    .bind(group_id)
    .bind(group.leader_id)
    .bind(OrderStatus::PendingSettlement)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(group_id, ref_id = %verified.ref_id, "settlement payment verified");
    Ok(VerifyOutcome::Settled {
        group_id,
        ref_id: verified.ref_id,
    })
}

async fn fetch_group(pool: &SqlitePool, group_id: i64) -> Result<GroupOrder> {
    sqlx::query_as::<_, GroupOrder>("SELECT * FROM group_orders WHERE id = ?")
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::GroupNotFound(group_id))
}
