//! Shared test fixtures: an isolated in-memory database per test plus
//! seed helpers.

#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

use storefront_api::{
    db::DbPool,
    entities::product,
    events::{channel, Event, EventSender},
    migrator::Migrator,
    sessions::{InMemorySessionStore, SessionHandle},
};
use sea_orm_migration::MigratorTrait;

/// Fresh in-memory SQLite database with the full schema applied. A single
/// connection keeps every query on the same in-memory instance.
pub async fn setup_db() -> Arc<DbPool> {
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opts)
        .await
        .expect("in-memory sqlite should connect");
    Migrator::up(&db, None)
        .await
        .expect("migrations should apply");
    Arc::new(db)
}

/// Event channel whose receiver stays alive for the duration of the test.
pub fn test_events() -> (EventSender, mpsc::Receiver<Event>) {
    channel(64)
}

pub async fn seed_product(
    db: &DbPool,
    name: &str,
    quantity: i32,
    price: Decimal,
    discount: Decimal,
) -> product::Model {
    product::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        category: Set(Some("Fruits".to_string())),
        image: Set(None),
        quantity: Set(quantity),
        price: Set(price),
        discount: Set(discount),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("product seed should insert")
}

/// A session bound to a fresh in-memory store.
pub fn new_session() -> SessionHandle {
    let store = Arc::new(InMemorySessionStore::new(Duration::from_secs(3600)));
    SessionHandle::new("test-session".to_string(), store)
}
