use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use bite_payment::{Payment, PaymentMethod};
use bite_shared::CreatePaymentRequest;
use serde::Deserialize;

use crate::error::{AppError, AppJson, AppPath};
use crate::idempotency::IdempotencyKey;
use crate::state::PaymentState;

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    #[serde(default)]
    pub method: String,
}

pub fn routes() -> Router<PaymentState> {
    Router::new()
        .route("/api/payments", get(list_payments).post(create_payment))
        .route("/api/payments/{id}", get(get_payment))
        .route("/api/payments/{id}/process", put(process_payment))
        .route("/api/payments/{id}/refund", put(refund_payment))
        .route("/api/orders/{order_id}/payments", get(list_order_payments))
}

/// GET /api/payments
pub async fn list_payments(State(state): State<PaymentState>) -> Json<Vec<Payment>> {
    Json(state.payments.list_payments().await)
}

/// POST /api/payments
/// Called by the order service for every new order
pub async fn create_payment(
    State(state): State<PaymentState>,
    key: IdempotencyKey,
    AppJson(req): AppJson<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state
        .payments
        .create_payment_with_key(req, key.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /api/payments/{id}
pub async fn get_payment(
    State(state): State<PaymentState>,
    AppPath(payment_id): AppPath<u64>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.payments.get_payment(payment_id).await?))
}

/// PUT /api/payments/{id}/process
pub async fn process_payment(
    State(state): State<PaymentState>,
    AppPath(payment_id): AppPath<u64>,
    AppJson(req): AppJson<ProcessPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let method: PaymentMethod = req.method.parse()?;
    Ok(Json(state.payments.process_payment(payment_id, method).await?))
}

/// PUT /api/payments/{id}/refund
pub async fn refund_payment(
    State(state): State<PaymentState>,
    AppPath(payment_id): AppPath<u64>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.payments.refund_payment(payment_id).await?))
}

pub async fn list_order_payments(
    State(state): State<PaymentState>,
    AppPath(order_id): AppPath<u64>,
) -> Json<Vec<Payment>> {
    Json(state.payments.list_by_order(order_id).await)
}
