//! HTTP handlers, grouped by surface. Each submodule exposes a
//! `routes()` returning a router over the shared [`AppState`].

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod products;
pub mod users;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Every route the API serves, public and admin.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(products::routes())
        .merge(cart::routes())
        .merge(checkout::routes())
        .merge(orders::routes())
        .merge(users::routes())
        .nest("/admin", admin::routes())
}
