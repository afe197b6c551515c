use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use busline_booking::{NewPayment, OperatorPayments};
use busline_core::payment::{PaymentRecord, PaymentStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorPaymentsQuery {
    pub status: Option<PaymentStatus>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(create_payment))
        .route("/v1/payments/{payment_id}/status", put(update_payment_status))
        .route("/v1/operators/{operator_id}/payments", get(operator_payments))
}

/// POST /v1/payments
async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<NewPayment>,
) -> Result<(StatusCode, Json<PaymentRecord>), AppError> {
    let record = state.payments.create(&req).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /v1/payments/:payment_id/status
/// Provider callback. Tickets are never touched from here.
async fn update_payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    Json(req): Json<PaymentStatusRequest>,
) -> Result<Json<PaymentRecord>, AppError> {
    Ok(Json(state.payments.update_status(&payment_id, req.status).await?))
}

/// GET /v1/operators/:operator_id/payments?status=succeeded
async fn operator_payments(
    State(state): State<AppState>,
    Path(operator_id): Path<Uuid>,
    Query(query): Query<OperatorPaymentsQuery>,
) -> Result<Json<OperatorPayments>, AppError> {
    Ok(Json(state.payments.for_operator(operator_id, query.status).await?))
}
