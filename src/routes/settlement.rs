//! Settlement payment and refund-request handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use validator::Validate;

use crate::domain::group::GroupStatus;
use crate::domain::GroupEvent;
use crate::error::{AppError, Result};
use crate::routes::groups::fetch_group;
use crate::routes::AppState;
use crate::settlement::payment::{self, PaymentSession, VerifyOutcome};

/// Open a gateway charge for a group's outstanding settlement.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentSession>> {
    let session = payment::initiate(
        &state.db,
        state.gateway.as_ref(),
        &state.settings.settlement_callback_url,
        id,
        Utc::now(),
    )
    .await?;
    Ok(Json(session))
}

#[derive(Debug, serde::Deserialize)]
pub struct VerifyParams {
    #[serde(alias = "Authority")]
    pub authority: String,
    /// Gateways redirect back with OK/NOK; anything but OK means the user
    /// abandoned or the charge failed before verification.
    #[serde(alias = "Status")]
    pub status: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct VerifyResponse {
    pub group_id: i64,
    pub settled: bool,
    pub ref_id: Option<String>,
    pub message: &'static str,
}

/// Gateway redirect target for settlement payments. Safe to hit twice: a
/// duplicate callback for an already-settled group changes nothing.
pub async fn verify_payment(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerifyResponse>> {
    if let Some(status) = params.status.as_deref() {
        if status != "OK" {
            return Err(AppError::invalid_state("payment was canceled at the gateway"));
        }
    }
    match payment::verify(&state.db, state.gateway.as_ref(), &params.authority, Utc::now()).await? {
        VerifyOutcome::Settled { group_id, ref_id } => {
            state
                .notifier
                .publish(&GroupEvent::SettlementPaid {
                    group_id,
                    ref_id: ref_id.clone(),
                })
                .await;
            Ok(Json(VerifyResponse {
                group_id,
                settled: true,
                ref_id: Some(ref_id),
                message: "تسویه حساب با موفقیت انجام شد",
            }))
        }
        VerifyOutcome::AlreadySettled { group_id } => Ok(Json(VerifyResponse {
            group_id,
            settled: true,
            ref_id: None,
            message: "این گروه قبلا تسویه شده است",
        })),
    }
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct RefundRequest {
    #[validate(length(min = 16, max = 19))]
    pub card_number: String,
    #[validate(range(min = 1))]
    pub amount: i64,
}

#[derive(Debug, serde::Serialize)]
pub struct RefundResponse {
    pub group_id: i64,
    pub refund_due_amount: i64,
    pub message: &'static str,
}

/// Record a leader's refund request. Refunds are paid out manually by the
/// back office; over-fulfillment never triggers one automatically.
pub async fn request_refund(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<RefundResponse>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let group = fetch_group(&state.db, id).await?;
    if group.status == GroupStatus::Forming {
        return Err(AppError::invalid_state("group is still forming"));
    }
    if group.refund_requested_at.is_some() {
        return Err(AppError::invalid_state("a refund has already been requested"));
    }
    sqlx::query(
        "UPDATE group_orders SET refund_due_amount = ?, refund_card_number = ?, refund_requested_at = ? WHERE id = ?",
    )
    .bind(req.amount)
    .bind(&req.card_number)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db)
    .await?;
    Ok(Json(RefundResponse {
        group_id: id,
        refund_due_amount: req.amount,
        message: "درخواست استرداد ثبت شد",
    }))
}
