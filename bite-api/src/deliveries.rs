use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use bite_delivery::{Courier, Delivery, DeliveryStatus, NewCourier};
use bite_shared::{CreateDeliveryRequest, StatusUpdateRequest};
use serde::Deserialize;

use crate::error::{AppError, AppJson, AppPath};
use crate::idempotency::IdempotencyKey;
use crate::state::DeliveryState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityUpdateRequest {
    pub available: bool,
}

pub fn routes() -> Router<DeliveryState> {
    Router::new()
        .route("/api/deliveries", get(list_deliveries).post(create_delivery))
        .route("/api/deliveries/{id}", get(get_delivery))
        .route("/api/deliveries/{id}/status", put(update_status))
        .route("/api/orders/{order_id}/deliveries", get(list_order_deliveries))
        .route("/api/couriers", get(list_couriers).post(create_courier))
        .route("/api/couriers/{id}", get(get_courier))
        .route("/api/couriers/{id}/availability", put(update_availability))
        .route("/api/couriers/{id}/deliveries", get(list_courier_deliveries))
}

// ============================================================================
// Deliveries
// ============================================================================

pub async fn list_deliveries(State(state): State<DeliveryState>) -> Json<Vec<Delivery>> {
    Json(state.deliveries.list_deliveries().await)
}

/// POST /api/deliveries
/// Called by the order service once an order is paid
pub async fn create_delivery(
    State(state): State<DeliveryState>,
    key: IdempotencyKey,
    AppJson(req): AppJson<CreateDeliveryRequest>,
) -> (StatusCode, Json<Delivery>) {
    let delivery = state
        .deliveries
        .create_delivery_with_key(req, key.as_deref())
        .await;
    (StatusCode::CREATED, Json(delivery))
}

pub async fn get_delivery(
    State(state): State<DeliveryState>,
    AppPath(delivery_id): AppPath<u64>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(state.deliveries.get_delivery(delivery_id).await?))
}

/// PUT /api/deliveries/{id}/status
pub async fn update_status(
    State(state): State<DeliveryState>,
    AppPath(delivery_id): AppPath<u64>,
    AppJson(req): AppJson<StatusUpdateRequest>,
) -> Result<Json<Delivery>, AppError> {
    let status: DeliveryStatus = req.status.parse()?;
    Ok(Json(state.deliveries.update_status(delivery_id, status).await?))
}

pub async fn list_order_deliveries(
    State(state): State<DeliveryState>,
    AppPath(order_id): AppPath<u64>,
) -> Json<Vec<Delivery>> {
    Json(state.deliveries.list_by_order(order_id).await)
}

// ============================================================================
// Couriers
// ============================================================================

pub async fn list_couriers(State(state): State<DeliveryState>) -> Json<Vec<Courier>> {
    Json(state.deliveries.list_couriers().await)
}

pub async fn create_courier(
    State(state): State<DeliveryState>,
    AppJson(req): AppJson<NewCourier>,
) -> (StatusCode, Json<Courier>) {
    let courier = state.deliveries.create_courier(req).await;
    (StatusCode::CREATED, Json(courier))
}

pub async fn get_courier(
    State(state): State<DeliveryState>,
    AppPath(courier_id): AppPath<u64>,
) -> Result<Json<Courier>, AppError> {
    Ok(Json(state.deliveries.get_courier(courier_id).await?))
}

/// PUT /api/couriers/{id}/availability
pub async fn update_availability(
    State(state): State<DeliveryState>,
    AppPath(courier_id): AppPath<u64>,
    AppJson(req): AppJson<AvailabilityUpdateRequest>,
) -> Result<Json<Courier>, AppError> {
    Ok(Json(
        state
            .deliveries
            .set_availability(courier_id, req.available)
            .await?,
    ))
}

pub async fn list_courier_deliveries(
    State(state): State<DeliveryState>,
    AppPath(courier_id): AppPath<u64>,
) -> Json<Vec<Delivery>> {
    Json(state.deliveries.list_by_courier(courier_id).await)
}
