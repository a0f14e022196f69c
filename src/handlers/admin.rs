//! Admin panel: product CRUD, order management, and account management.
//! Every route here requires an authenticated session with the admin role.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;

use crate::{
    auth::AdminUser,
    entities::{product, user},
    errors::ApiError,
    services::{
        catalog::{CreateProductInput, UpdateProductInput},
        orders::OrderWithItems,
        users::AdminUpdateUserInput,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id", delete(delete_product))
        .route("/orders", get(list_orders))
        .route("/orders/:order_id", delete(delete_order))
        .route("/users", get(list_users))
        .route("/users/:id", put(update_user))
        .route("/users/:id", delete(delete_user))
}

#[utoipa::path(
    post,
    path = "/admin/products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = product::Model),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(input): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<product::Model>), ApiError> {
    let created = state.catalog.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/admin/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    request_body = UpdateProductInput,
    responses(
        (status = 200, description = "Updated product", body = product::Model),
        (status = 404, description = "No such product", body = crate::errors::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Json<product::Model>, ApiError> {
    Ok(Json(state.catalog.update_product(id, input).await?))
}

#[utoipa::path(
    delete,
    path = "/admin/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "No such product", body = crate::errors::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/admin/orders",
    responses((status = 200, description = "All orders, newest first", body = [OrderWithItems])),
    tag = "admin"
)]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<OrderWithItems>>, ApiError> {
    Ok(Json(state.orders.list_all().await?))
}

#[utoipa::path(
    delete,
    path = "/admin/orders/{order_id}",
    params(("order_id" = String, Path, description = "Public order identifier")),
    responses(
        (status = 204, description = "Order and its items deleted"),
        (status = 404, description = "No such order", body = crate::errors::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orders.delete_order(&order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All accounts", body = [user::Model])),
    tag = "admin"
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<user::Model>>, ApiError> {
    Ok(Json(state.users.list_users().await?))
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    params(("id" = i32, Path, description = "Account id")),
    request_body = AdminUpdateUserInput,
    responses(
        (status = 200, description = "Updated account", body = user::Model),
        (status = 409, description = "Email already in use", body = crate::errors::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i32>,
    Json(input): Json<AdminUpdateUserInput>,
) -> Result<Json<user::Model>, ApiError> {
    Ok(Json(state.users.admin_update_user(id, input).await?))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = i32, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 400, description = "Admins cannot delete themselves", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such account", body = crate::errors::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state.users.delete_user(id, &admin.email).await?;
    Ok(StatusCode::NO_CONTENT)
}
