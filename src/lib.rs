//! Storefront API: an online supermarket backend.
//!
//! Catalog browsing, server-side session carts, a transactional checkout
//! that can never oversell, order history, and an admin panel, served over
//! HTTP with axum and persisted with SeaORM.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod sessions;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{CartService, CatalogService, CheckoutService, OrderService, UserService},
    sessions::SessionLayer,
};

/// Shared state behind every handler.
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub sessions: Arc<SessionLayer>,
    pub catalog: CatalogService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub users: UserService,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        event_sender: EventSender,
        sessions: Arc<SessionLayer>,
    ) -> Self {
        Self {
            catalog: CatalogService::new(db.clone(), event_sender.clone()),
            cart: CartService::new(db.clone()),
            checkout: CheckoutService::new(db.clone(), event_sender.clone()),
            orders: OrderService::new(db.clone(), event_sender.clone()),
            users: UserService::new(db.clone(), event_sender.clone()),
            db,
            config,
            event_sender,
            sessions,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Builds the full application router: API routes, health check, and the
/// session middleware that binds each request to its cart.
pub fn app_router(state: Arc<AppState>) -> Router {
    let session_layer = state.sessions.clone();
    Router::new()
        .merge(handlers::routes())
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(
            session_layer,
            sessions::session_middleware,
        ))
        .with_state(state)
}
