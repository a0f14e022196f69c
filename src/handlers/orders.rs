//! Order history for the signed-in customer.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::{auth::CurrentUser, errors::ApiError, services::orders::OrderWithItems, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(order_history))
        .route("/orders/:order_id", get(get_order))
}

#[utoipa::path(
    get,
    path = "/orders",
    responses(
        (status = 200, description = "Caller's orders, newest first", body = [OrderWithItems]),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn order_history(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<OrderWithItems>>, ApiError> {
    Ok(Json(state.orders.history_for(&user.email).await?))
}

#[utoipa::path(
    get,
    path = "/orders/{order_id}",
    params(("order_id" = String, Path, description = "Public order identifier")),
    responses(
        (status = 200, description = "The order with its items", body = OrderWithItems),
        (status = 403, description = "Order belongs to another account", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such order", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderWithItems>, ApiError> {
    Ok(Json(
        state
            .orders
            .get_order(&order_id, &user.email, user.is_admin())
            .await?,
    ))
}
