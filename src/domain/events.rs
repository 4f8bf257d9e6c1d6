//! Domain events published to NATS for the notification workers.

use serde::Serialize;

use crate::domain::group::GroupStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    Finalized {
        group_id: i64,
        leader_id: i64,
        status: GroupStatus,
        actual_friends: i64,
        expected_friends: i64,
    },
    SettlementRequired {
        group_id: i64,
        leader_id: i64,
        amount: i64,
    },
    SettlementPaid {
        group_id: i64,
        ref_id: String,
    },
    Expired {
        group_id: i64,
        leader_id: i64,
    },
}

impl GroupEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Finalized { .. } => "bahamm.events.group.finalized",
            Self::SettlementRequired { .. } => "bahamm.events.group.settlement_required",
            Self::SettlementPaid { .. } => "bahamm.events.group.settlement_paid",
            Self::Expired { .. } => "bahamm.events.group.expired",
        }
    }
}
