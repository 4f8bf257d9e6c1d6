//! HTTP surface. Thin glue over the settlement core; all interesting logic
//! lives in `settlement` and `domain`.

pub mod groups;
pub mod settlement;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::gateway::PaymentGateway;
use crate::notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Notifier,
    pub settings: Arc<Settings>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async {
                Json(serde_json::json!({"status": "healthy", "service": "bahamm-settlement"}))
            }),
        )
        .route("/api/v1/groups", post(groups::create_group))
        .route("/api/v1/groups/:id", get(groups::get_group))
        .route("/api/v1/groups/invite/:token", get(groups::resolve_invite))
        .route("/api/v1/groups/:id/join", post(groups::join_group))
        .route("/api/v1/groups/:id/recompute", post(groups::recompute_group))
        .route("/api/v1/groups/:id/finalize", post(groups::finalize_group))
        .route(
            "/api/v1/groups/:id/settlement/pay",
            post(settlement::initiate_payment),
        )
        .route("/api/v1/settlement/verify", get(settlement::verify_payment))
        .route(
            "/api/v1/groups/:id/refund-request",
            post(settlement::request_refund),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
