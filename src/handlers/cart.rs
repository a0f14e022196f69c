//! Session cart endpoints. The cart lives server-side; every route here
//! operates on the caller's cookie-bound session.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ApiError,
    services::cart::CartMutation,
    sessions::{CartLine, SessionHandle},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: i32,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCartLineRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub total: rust_decimal::Decimal,
}

impl CartView {
    fn from_lines(items: Vec<CartLine>) -> Self {
        let total = crate::services::checkout::round_money(
            items
                .iter()
                .map(|l| l.unit_price * rust_decimal::Decimal::from(l.quantity))
                .sum(),
        );
        Self { items, total }
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart", get(view_cart))
        .route("/cart", delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:product_id", put(update_item))
        .route("/cart/items/:product_id", delete(remove_item))
}

#[utoipa::path(
    get,
    path = "/cart",
    responses((status = 200, description = "Current cart with running total", body = CartView)),
    tag = "cart"
)]
pub async fn view_cart(session: SessionHandle) -> Json<CartView> {
    let data = session.get().await;
    Json(CartView::from_lines(data.cart))
}

#[utoipa::path(
    post,
    path = "/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Updated cart; quantity may be clamped to stock", body = CartMutation),
        (status = 404, description = "Product not in catalog", body = crate::errors::ErrorResponse)
    ),
    tag = "cart"
)]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartMutation>, ApiError> {
    req.validate()
        .map_err(|e| ApiError::ValidationError(e.to_string()))?;
    let mutation = state
        .cart
        .add_item(&session, req.product_id, req.quantity)
        .await?;
    Ok(Json(mutation))
}

#[utoipa::path(
    put,
    path = "/cart/items/{product_id}",
    params(("product_id" = i32, Path, description = "Product id of the cart line")),
    request_body = UpdateCartLineRequest,
    responses(
        (status = 200, description = "Updated cart; zero quantity removes the line", body = CartMutation)
    ),
    tag = "cart"
)]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    Path(product_id): Path<i32>,
    Json(req): Json<UpdateCartLineRequest>,
) -> Result<Json<CartMutation>, ApiError> {
    let mutation = state
        .cart
        .update_quantity(&session, product_id, req.quantity)
        .await?;
    Ok(Json(mutation))
}

#[utoipa::path(
    delete,
    path = "/cart/items/{product_id}",
    params(("product_id" = i32, Path, description = "Product id of the cart line")),
    responses((status = 200, description = "Updated cart", body = CartMutation)),
    tag = "cart"
)]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    Path(product_id): Path<i32>,
) -> Result<Json<CartMutation>, ApiError> {
    Ok(Json(state.cart.remove_item(&session, product_id).await?))
}

#[utoipa::path(
    delete,
    path = "/cart",
    responses((status = 204, description = "Cart emptied")),
    tag = "cart"
)]
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
) -> Result<StatusCode, ApiError> {
    state.cart.clear(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}
