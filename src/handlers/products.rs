//! Public catalog browsing.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    entities::product,
    errors::ApiError,
    services::catalog::ProductFilter,
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductPage {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/categories", get(list_categories))
}

/// List products with optional category and price-range filters.
#[utoipa::path(
    get,
    path = "/products",
    params(
        ("category" = Option<String>, Query, description = "Category filter; omit or \"All\" for everything"),
        ("min_price" = Option<String>, Query, description = "Lower price bound"),
        ("max_price" = Option<String>, Query, description = "Upper price bound"),
        ("page" = Option<u64>, Query, description = "1-based page number"),
        ("per_page" = Option<u64>, Query, description = "Page size, capped at 100"),
    ),
    responses(
        (status = 200, description = "Matching products", body = ProductPage)
    ),
    tag = "catalog"
)]
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<ProductPage>, ApiError> {
    let (products, total) = state.catalog.list_products(&filter).await?;
    Ok(Json(ProductPage {
        products,
        total,
        page: filter.page.max(1),
        per_page: filter.per_page.clamp(1, 100),
    }))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "The product", body = product::Model),
        (status = 404, description = "No such product", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<product::Model>, ApiError> {
    Ok(Json(state.catalog.get_product(id).await?))
}

#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "Known categories", body = [String])),
    tag = "catalog"
)]
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.catalog.list_categories().await?))
}
