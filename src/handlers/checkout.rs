//! Checkout endpoint plus the purchase-confirmation view.
//!
//! A successful checkout clears the session cart and stashes the receipt
//! in the session; a failed one leaves the cart untouched so the caller
//! can adjust and retry.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::{
    auth::CurrentUser,
    errors::ApiError,
    services::checkout::{CustomerIdentity, PlacedOrder},
    sessions::SessionHandle,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkout", post(place_order))
        .route("/checkout/last", get(last_purchase))
}

#[utoipa::path(
    post,
    path = "/checkout",
    responses(
        (status = 201, description = "Order placed", body = PlacedOrder),
        (status = 400, description = "Cart is empty", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "A cart line references a removed product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock for a cart line", body = crate::errors::ErrorResponse)
    ),
    tag = "checkout"
)]
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    session: SessionHandle,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let cart = session.get().await.cart;
    let customer = CustomerIdentity::from(&user);

    let placed = state
        .checkout
        .checkout(&cart, &customer)
        .await
        .map_err(crate::errors::ServiceError::from)?;

    session
        .update(|s| {
            s.cart.clear();
            s.last_order = Some(placed.clone());
        })
        .await;

    Ok((StatusCode::CREATED, Json(placed)))
}

/// The confirmation view: the session's receipt if present, otherwise the
/// caller's most recent order from the database.
#[utoipa::path(
    get,
    path = "/checkout/last",
    responses(
        (status = 200, description = "Most recent purchase", body = PlacedOrder),
        (status = 404, description = "No purchases yet", body = crate::errors::ErrorResponse)
    ),
    tag = "checkout"
)]
pub async fn last_purchase(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    session: SessionHandle,
) -> Result<Json<PlacedOrder>, ApiError> {
    if let Some(receipt) = session.get().await.last_order {
        return Ok(Json(receipt));
    }

    let latest = state
        .orders
        .latest_for(&user.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("No purchases yet".into()))?;

    Ok(Json(PlacedOrder {
        order_id: latest.order.order_id,
        user_email: latest.order.user_email,
        total: latest.order.total,
        items: latest
            .items
            .into_iter()
            .map(|i| crate::services::checkout::PlacedItem {
                product_id: i.product_id,
                product_name: i.product_name,
                quantity: i.quantity,
                unit_price: i.price,
                image: i.image,
            })
            .collect(),
        created_at: latest.order.created_at,
    }))
}
