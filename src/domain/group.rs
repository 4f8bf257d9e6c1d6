//! Group-buy campaign state model.
//!
//! A group moves `Forming → FinalizedSuccess | FinalizedShort | Expired`.
//! `Expired` is reserved for groups whose leader never paid; a paid leader
//! always ends in one of the finalized states, with settlement bookkeeping
//! layered on top of `FinalizedShort`.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::order::Order;

/// Fallback when neither the group row, the leader's delivery slot, nor
/// `max_friends` yields an expected friend count.
pub const DEFAULT_EXPECTED_FRIENDS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Forming,
    FinalizedSuccess,
    FinalizedShort,
    Expired,
}

impl GroupStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Forming)
    }

    /// Storefront label. Presentation only.
    pub fn label_fa(&self) -> &'static str {
        match self {
            Self::Forming => "در حال تشکیل",
            Self::FinalizedSuccess => "تکمیل شده",
            Self::FinalizedShort => "بسته شده با کسری",
            Self::Expired => "منقضی شده",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupOrder {
    pub id: i64,
    pub leader_id: i64,
    pub invite_token: String,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub leader_paid_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    /// Serialized [`crate::domain::basket::BasketSnapshot`].
    pub basket_snapshot: Option<String>,
    pub expected_friends: Option<i64>,
    pub max_friends: i64,
    pub allow_consolidation: bool,
    pub settlement_required: bool,
    pub settlement_amount: i64,
    pub settlement_paid_at: Option<DateTime<Utc>>,
    pub refund_due_amount: i64,
    pub refund_card_number: Option<String>,
    pub refund_requested_at: Option<DateTime<Utc>>,
    pub refund_paid_at: Option<DateTime<Utc>>,
}

impl GroupOrder {
    /// Resolve the expected friend count: explicit field, then the leader
    /// order's delivery-slot payload, then `max_friends`, then the default.
    /// The second element reports whether the value was inferred, in which
    /// case the calculator writes it back so recomputation stays stable.
    pub fn resolve_expected_friends(&self, leader: Option<&Order>) -> (i64, bool) {
        if let Some(n) = self.expected_friends.filter(|n| *n >= 0) {
            return (n, false);
        }
        if let Some(n) = leader.and_then(Order::delivery_slot_friends) {
            return (n, true);
        }
        if self.max_friends > 0 {
            return (self.max_friends, true);
        }
        (DEFAULT_EXPECTED_FRIENDS, true)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderKind, OrderStatus};

    fn group(expected: Option<i64>, max_friends: i64) -> GroupOrder {
        let now = Utc::now();
        GroupOrder {
            id: 1,
            leader_id: 10,
            invite_token: "tok".into(),
            status: GroupStatus::Forming,
            created_at: now,
            expires_at: now,
            leader_paid_at: None,
            finalized_at: None,
            basket_snapshot: None,
            expected_friends: expected,
            max_friends,
            allow_consolidation: false,
            settlement_required: false,
            settlement_amount: 0,
            settlement_paid_at: None,
            refund_due_amount: 0,
            refund_card_number: None,
            refund_requested_at: None,
            refund_paid_at: None,
        }
    }

    fn leader_with_slot(slot: &str) -> Order {
        let now = Utc::now();
        Order {
            id: 2,
            user_id: 10,
            group_order_id: Some(1),
            order_type: OrderKind::Group,
            status: OrderStatus::Completed,
            is_settlement_payment: false,
            payment_authority: None,
            payment_ref_id: None,
            paid_at: Some(now),
            delivery_slot: Some(slot.into()),
            total_amount: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn explicit_expected_friends_wins() {
        let leader = leader_with_slot(r#"{"friends":5}"#);
        assert_eq!(group(Some(2), 4).resolve_expected_friends(Some(&leader)), (2, false));
    }

    #[test]
    fn falls_back_to_delivery_slot_then_max() {
        let leader = leader_with_slot(r#"{"friends":5}"#);
        assert_eq!(group(None, 4).resolve_expected_friends(Some(&leader)), (5, true));
        assert_eq!(group(None, 4).resolve_expected_friends(None), (4, true));
    }

    #[test]
    fn hardcoded_default_as_last_resort() {
        assert_eq!(
            group(None, 0).resolve_expected_friends(None),
            (DEFAULT_EXPECTED_FRIENDS, true)
        );
    }
}
