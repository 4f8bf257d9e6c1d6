//! Orders and line items.
//!
//! The legacy storefront stored order state as free-form strings, Persian
//! labels included, and recorded payment confirmation in three different
//! columns over the years. Both quirks are contained here: `OrderStatus` is a
//! closed enum with a read-compatibility shim for the legacy labels, and
//! [`Order::has_payment_evidence`] implements the OR rule over the redundant
//! payment signals.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, FromRow, Sqlite, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Alone,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created but not yet confirmed by the gateway.
    Pending,
    /// Paid and fully settled from the order's own point of view.
    Completed,
    /// Leader order waiting on a settlement payment for its group.
    PendingSettlement,
}

impl OrderStatus {
    /// Canonical column value. New writes always use these.
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::PendingSettlement => "pending_settlement",
        }
    }

    /// Decode a stored status, accepting the legacy free-form labels that
    /// survive in migrated rows. Unknown strings fall back to `Pending`,
    /// which carries no payment evidence on its own.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim() {
            "completed" | "paid" | "تکمیل شده" => Self::Completed,
            "pending_settlement" | "در انتظار تسویه" => Self::PendingSettlement,
            _ => Self::Pending,
        }
    }

    /// Whether the status alone is proof the order was paid.
    ///
    /// `PendingSettlement` counts: it is a post-payment state a leader order
    /// enters only after its own payment went through.
    pub fn implies_paid(&self) -> bool {
        matches!(self, Self::Completed | Self::PendingSettlement)
    }

    /// Human-readable label for the storefront. Presentation only; never
    /// compared or persisted.
    pub fn label_fa(&self) -> &'static str {
        match self {
            Self::Pending => "در انتظار پرداخت",
            Self::Completed => "تکمیل شده",
            Self::PendingSettlement => "در انتظار تسویه",
        }
    }
}

// Stored as TEXT; decode goes through the legacy shim, so the sqlx::Type
// derive (which rejects unknown strings) is not usable here.
impl Type<Sqlite> for OrderStatus {
    fn type_info() -> SqliteTypeInfo {
        <&str as Type<Sqlite>>::type_info()
    }
}

impl<'r> Decode<'r, Sqlite> for OrderStatus {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as Decode<Sqlite>>::decode(value)?;
        Ok(Self::from_label(raw))
    }
}

impl<'q> Encode<'q, Sqlite> for OrderStatus {
    fn encode_by_ref(&self, args: &mut Vec<SqliteArgumentValue<'q>>) -> sqlx::encode::IsNull {
        args.push(SqliteArgumentValue::Text(Cow::Borrowed(self.as_db())));
        sqlx::encode::IsNull::No
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub group_order_id: Option<i64>,
    pub order_type: OrderKind,
    pub status: OrderStatus,
    pub is_settlement_payment: bool,
    pub payment_authority: Option<String>,
    pub payment_ref_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Raw JSON payload from the checkout flow; may carry the expected
    /// friend count under a `friends` or `expected_friends` key.
    pub delivery_slot: Option<String>,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The paid-evidence OR rule: any one of the three historical payment
    /// signals is enough. Partial writes during schema evolution left rows
    /// where only one of them is populated.
    pub fn has_payment_evidence(&self) -> bool {
        self.payment_ref_id.is_some() || self.paid_at.is_some() || self.status.implies_paid()
    }

    /// Expected friend count buried in the delivery-slot payload, if any.
    pub fn delivery_slot_friends(&self) -> Option<i64> {
        let raw = self.delivery_slot.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        value
            .get("friends")
            .or_else(|| value.get("expected_friends"))
            .and_then(|v| v.as_i64())
            .filter(|n| *n >= 0)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: i64,
}
