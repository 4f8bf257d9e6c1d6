//! Best-effort notification publisher.
//!
//! Settlement state transitions never wait on or fail because of
//! notifications; a missing NATS connection simply drops events.

use tracing::warn;

use crate::domain::GroupEvent;
use crate::settlement::FinalizeOutcome;

#[derive(Clone)]
pub struct Notifier {
    client: Option<async_nats::Client>,
}

impl Notifier {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, event: &GroupEvent) {
        let Some(client) = &self.client else {
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "failed to serialize group event");
                return;
            }
        };
        if let Err(error) = client.publish(event.subject().to_string(), payload.into()).await {
            warn!(%error, subject = event.subject(), "failed to publish group event");
        }
    }

    /// Publish the events implied by closing a group. Used by both the
    /// sweeper and the API handlers so the two paths stay consistent.
    pub async fn announce_close(&self, leader_id: i64, outcome: &FinalizeOutcome) {
        match outcome {
            FinalizeOutcome::Finalized { status, settlement } => {
                self.publish(&GroupEvent::Finalized {
                    group_id: settlement.group_id,
                    leader_id,
                    status: *status,
                    actual_friends: settlement.actual_friends,
                    expected_friends: settlement.expected_friends,
                })
                .await;
                if settlement.settlement_required {
                    self.publish(&GroupEvent::SettlementRequired {
                        group_id: settlement.group_id,
                        leader_id,
                        amount: settlement.settlement_amount,
                    })
                    .await;
                }
            }
            FinalizeOutcome::Expired { group_id } => {
                self.publish(&GroupEvent::Expired {
                    group_id: *group_id,
                    leader_id,
                })
                .await;
            }
            FinalizeOutcome::AlreadyClosed { .. } => {}
        }
    }
}
