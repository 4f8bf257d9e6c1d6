//! Service error taxonomy.
//!
//! Not-found conditions map to 404, invalid state transitions to 409,
//! payload problems to 422, gateway failures to 502. Database and
//! serialization failures surface as 500 with the detail kept in the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::gateway::GatewayError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("group {0} not found")]
    GroupNotFound(i64),

    #[error("order not found")]
    OrderNotFound,

    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error("invite token not recognized")]
    InviteNotFound,

    #[error("{0}")]
    InvalidState(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::GroupNotFound(_)
            | Self::OrderNotFound
            | Self::ProductNotFound(_)
            | Self::InviteNotFound => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
