//! Group lifecycle handlers: creation, invite resolution, joining,
//! recomputation, and manual finalize.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::domain::basket::{BasketLine, BasketSnapshot};
use crate::domain::group::{GroupOrder, GroupStatus};
use crate::domain::order::{OrderKind, OrderStatus};
use crate::domain::pricing::Product;
use crate::error::{AppError, Result};
use crate::routes::AppState;
use crate::settlement::{self, FinalizeOutcome, SettlementOutcome};

#[derive(Debug, serde::Serialize)]
pub struct GroupResponse {
    pub id: i64,
    pub leader_id: i64,
    pub invite_token: String,
    pub status: GroupStatus,
    pub status_label: &'static str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub expected_friends: Option<i64>,
    pub max_friends: i64,
    pub allow_consolidation: bool,
    pub settlement_required: bool,
    pub settlement_amount: i64,
    pub settlement_paid_at: Option<DateTime<Utc>>,
}

impl From<GroupOrder> for GroupResponse {
    fn from(group: GroupOrder) -> Self {
        Self {
            id: group.id,
            leader_id: group.leader_id,
            invite_token: group.invite_token,
            status: group.status,
            status_label: group.status.label_fa(),
            created_at: group.created_at,
            expires_at: group.expires_at,
            finalized_at: group.finalized_at,
            expected_friends: group.expected_friends,
            max_friends: group.max_friends,
            allow_consolidation: group.allow_consolidation,
            settlement_required: group.settlement_required,
            settlement_amount: group.settlement_amount,
            settlement_paid_at: group.settlement_paid_at,
        }
    }
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct CreateGroupRequest {
    pub leader_id: i64,
    #[validate(range(min = 0, max = 20))]
    pub expected_friends: Option<i64>,
    #[validate(range(min = 1, max = 20))]
    pub max_friends: Option<i64>,
    #[validate(range(min = 1, max = 168))]
    pub lifetime_hours: Option<i64>,
    #[serde(default)]
    pub allow_consolidation: bool,
    /// Gateway reference from the leader's verified checkout payment.
    pub payment_ref_id: Option<String>,
    /// Raw delivery-slot payload from checkout; kept verbatim on the order.
    pub delivery_slot: Option<serde_json::Value>,
    #[validate(length(min = 1))]
    pub items: Vec<CreateGroupItem>,
}

// Serialize is needed by the length validation on `items`, which embeds the
// offending value in the validation error.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CreateGroupItem {
    pub product_id: i64,
    pub quantity: i64,
}

/// Create a group-buy campaign. Invoked once the leader's checkout payment
/// is verified: the leader order is recorded as paid, and the basket prices
/// are frozen into a snapshot at the expected-friends tier.
pub async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let now = Utc::now();
    let max_friends = req.max_friends.unwrap_or(state.settings.default_max_friends);
    let pricing_tier = req.expected_friends.unwrap_or(max_friends);

    let mut tx = state.db.begin().await?;
    let mut lines = Vec::with_capacity(req.items.len());
    let mut total: i64 = 0;
    for item in &req.items {
        if item.quantity <= 0 {
            return Err(AppError::Validation("quantity must be positive".into()));
        }
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::ProductNotFound(item.product_id))?;
        let ladder = product.ladder();
        let unit_price = ladder.price_for_tier(pricing_tier);
        if unit_price == 0 {
            warn!(product_id = product.id, "product has no usable market price");
        }
        total += unit_price.saturating_mul(item.quantity);
        lines.push(BasketLine {
            product_id: product.id,
            quantity: item.quantity,
            unit_price,
            solo_price: ladder.market_price,
            ladder,
        });
    }
    let snapshot = BasketSnapshot::new(lines);
    let snapshot_json = snapshot.to_json()?;

    let invite_token = Uuid::new_v4().to_string();
    let lifetime_hours = req
        .lifetime_hours
        .unwrap_or(state.settings.group_lifetime_hours);
    let expires_at = now + chrono::Duration::hours(lifetime_hours);

    let group_id: i64 = sqlx::query_scalar(
        "INSERT INTO group_orders (leader_id, invite_token, status, created_at, expires_at, \
         leader_paid_at, basket_snapshot, expected_friends, max_friends, allow_consolidation) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(req.leader_id)
    .bind(&invite_token)
    .bind(GroupStatus::Forming)
    .bind(now)
    .bind(expires_at)
    .bind(now)
    .bind(&snapshot_json)
    .bind(req.expected_friends)
    .bind(max_friends)
    .bind(req.allow_consolidation)
    .fetch_one(&mut *tx)
    .await?;

    let delivery_slot = req.delivery_slot.as_ref().map(|v| v.to_string());
    let order_id: i64 = sqlx::query_scalar(
        "INSERT INTO orders (user_id, group_order_id, order_type, status, payment_ref_id, \
         paid_at, delivery_slot, total_amount, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(req.leader_id)
    .bind(group_id)
    .bind(OrderKind::Group)
    .bind(OrderStatus::Completed)
    .bind(&req.payment_ref_id)
    .bind(now)
    .bind(&delivery_slot)
    .bind(total)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    for line in &snapshot.items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES (?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let group = fetch_group(&state.db, group_id).await?;
    Ok((StatusCode::CREATED, Json(group.into())))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<GroupResponse>> {
    Ok(Json(fetch_group(&state.db, id).await?.into()))
}

/// Resolve an invite code to its group. Exact match only; legacy token
/// formats were rewritten during the data migration.
pub async fn resolve_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<GroupResponse>> {
    let group = sqlx::query_as::<_, GroupOrder>("SELECT * FROM group_orders WHERE invite_token = ?")
        .bind(&token)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::InviteNotFound)?;
    Ok(Json(group.into()))
}

#[derive(Debug, serde::Deserialize)]
pub struct JoinGroupRequest {
    pub user_id: i64,
    /// Gateway reference from the follower's verified payment.
    pub payment_ref_id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct JoinGroupResponse {
    pub order_id: i64,
    pub group_id: i64,
    /// Set when this join completed the group and closed it early.
    pub group_status: GroupStatus,
}

/// Record a paid follower order against a forming group. Closes the group
/// early once the promised friend count is reached.
pub async fn join_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<JoinGroupRequest>,
) -> Result<Json<JoinGroupResponse>> {
    let now = Utc::now();
    let group = fetch_group(&state.db, id).await?;
    if group.status != GroupStatus::Forming {
        return Err(AppError::invalid_state("group is no longer forming"));
    }
    if group.is_expired_at(now) {
        return Err(AppError::invalid_state("group formation window has closed"));
    }
    if req.user_id == group.leader_id {
        return Err(AppError::invalid_state(
            "leader cannot join their own group as a follower",
        ));
    }
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE group_order_id = ? AND user_id = ? AND is_settlement_payment = 0",
    )
    .bind(id)
    .bind(req.user_id)
    .fetch_one(&state.db)
    .await?;
    if existing > 0 {
        return Err(AppError::invalid_state("user already has an order in this group"));
    }
    let followers: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE group_order_id = ? AND user_id != ? AND is_settlement_payment = 0",
    )
    .bind(id)
    .bind(group.leader_id)
    .fetch_one(&state.db)
    .await?;
    if followers >= group.max_friends {
        return Err(AppError::invalid_state("group is already full"));
    }

    let total = match group.basket_snapshot.as_deref().map(BasketSnapshot::parse) {
        Some(Ok(snapshot)) => snapshot.total(),
        Some(Err(error)) => {
            warn!(group_id = id, %error, "malformed basket snapshot; follower total recorded as zero");
            0
        }
        None => {
            warn!(group_id = id, "group has no basket snapshot; follower total recorded as zero");
            0
        }
    };

    let order_id: i64 = sqlx::query_scalar(
        "INSERT INTO orders (user_id, group_order_id, order_type, status, payment_ref_id, \
         paid_at, total_amount, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(req.user_id)
    .bind(id)
    .bind(OrderKind::Group)
    .bind(OrderStatus::Completed)
    .bind(&req.payment_ref_id)
    .bind(now)
    .bind(total)
    .bind(now)
    .bind(now)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match e {
        // Concurrent joins by the same user race past the COUNT guard; the
        // unique index turns the loser into the same conflict answer.
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::invalid_state("user already has an order in this group")
        }
        other => AppError::Database(other),
    })?;

    let mut group_status = GroupStatus::Forming;
    if let Some(outcome) = settlement::finalize_if_complete(&state.db, id, now).await? {
        if let FinalizeOutcome::Finalized { status, .. } = &outcome {
            group_status = *status;
        }
        state.notifier.announce_close(group.leader_id, &outcome).await;
    }

    Ok(Json(JoinGroupResponse {
        order_id,
        group_id: id,
        group_status,
    }))
}

/// API-triggered settlement recomputation. Converges with the sweeper on the
/// same idempotent calculator.
pub async fn recompute_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SettlementOutcome>> {
    let outcome = settlement::recompute(&state.db, id, Utc::now()).await?;
    Ok(Json(outcome))
}

#[derive(Debug, serde::Serialize)]
pub struct FinalizeResponse {
    pub group_id: i64,
    pub status: GroupStatus,
    pub status_label: &'static str,
    pub settlement: Option<SettlementOutcome>,
}

/// Close a group's formation window now instead of waiting for expiry.
pub async fn finalize_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FinalizeResponse>> {
    let group = fetch_group(&state.db, id).await?;
    let outcome = settlement::finalize(&state.db, id, Utc::now()).await?;
    state.notifier.announce_close(group.leader_id, &outcome).await;
    match outcome {
        FinalizeOutcome::Finalized { status, settlement } => Ok(Json(FinalizeResponse {
            group_id: id,
            status,
            status_label: status.label_fa(),
            settlement: Some(settlement),
        })),
        FinalizeOutcome::Expired { .. } => Ok(Json(FinalizeResponse {
            group_id: id,
            status: GroupStatus::Expired,
            status_label: GroupStatus::Expired.label_fa(),
            settlement: None,
        })),
        FinalizeOutcome::AlreadyClosed { .. } => {
            Err(AppError::invalid_state("group is not forming"))
        }
    }
}

pub(crate) async fn fetch_group(db: &SqlitePool, id: i64) -> Result<GroupOrder> {
    sqlx::query_as::<_, GroupOrder>("SELECT * FROM group_orders WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::GroupNotFound(id))
}
