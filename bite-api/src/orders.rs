use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use bite_order::{NewOrder, Order, OrderStatus};
use bite_shared::StatusUpdateRequest;

use crate::error::{AppError, AppJson, AppPath};
use crate::state::OrderState;

pub fn routes() -> Router<OrderState> {
    Router::new()
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/status", put(update_status))
        .route("/api/orders/{id}/cancel", put(cancel_order))
        .route("/api/orders/user/{user_id}/orders", get(list_user_orders))
        .route("/api/users/{user_id}/orders", get(list_user_orders))
        .route("/api/restaurants/{restaurant_id}/orders", get(list_restaurant_orders))
}

/// GET /api/orders
pub async fn list_orders(State(state): State<OrderState>) -> Json<Vec<Order>> {
    Json(state.orders.list_orders().await)
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<OrderState>,
    AppJson(req): AppJson<NewOrder>,
) -> (StatusCode, Json<Order>) {
    let order = state.orders.create_order(req).await;
    (StatusCode::CREATED, Json(order))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<OrderState>,
    AppPath(order_id): AppPath<u64>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.get_order(order_id).await?))
}

/// PUT /api/orders/{id}/status
/// Called by clients and by the payment and delivery services
pub async fn update_status(
    State(state): State<OrderState>,
    AppPath(order_id): AppPath<u64>,
    AppJson(req): AppJson<StatusUpdateRequest>,
) -> Result<Json<Order>, AppError> {
    let status: OrderStatus = req.status.parse()?;
    Ok(Json(state.orders.set_status(order_id, status).await?))
}

/// PUT /api/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<OrderState>,
    AppPath(order_id): AppPath<u64>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.cancel_order(order_id).await?))
}

pub async fn list_user_orders(
    State(state): State<OrderState>,
    AppPath(user_id): AppPath<u64>,
) -> Json<Vec<Order>> {
    Json(state.orders.list_by_user(user_id).await)
}

pub async fn list_restaurant_orders(
    State(state): State<OrderState>,
    AppPath(restaurant_id): AppPath<u64>,
) -> Json<Vec<Order>> {
    Json(state.orders.list_by_restaurant(restaurant_id).await)
}
