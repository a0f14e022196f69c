//! Per-session state: the signed-in user, the shopping cart, and the most
//! recent purchase receipt.
//!
//! The storefront keeps the cart in server-side session state keyed by a
//! cookie-bound opaque id. The storage backend sits behind the small
//! key-value [`SessionStore`] trait so nothing above this module knows
//! whether sessions live in process memory or in an external cache; the
//! shipped backend is an in-memory [`DashMap`] with TTL expiry.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::services::checkout::PlacedOrder;

/// One product line in a session cart. Name, image and the
/// discount-applied unit price are snapshots taken when the line is
/// created, so mid-cart catalog edits do not silently reprice the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CartLine {
    pub product_id: i32,
    pub product_name: String,
    /// Discount-applied unit price snapshot, 2dp
    pub unit_price: Decimal,
    pub quantity: i32,
    pub image: Option<String>,
}

/// Snapshot of the signed-in account carried in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SessionUser {
    pub username: String,
    pub email: String,
    pub role: String,
    pub address: Option<String>,
    pub contact: Option<String>,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Everything a session holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub user: Option<SessionUser>,
    pub cart: Vec<CartLine>,
    /// Receipt of the most recent successful checkout, for the
    /// confirmation view
    pub last_order: Option<PlacedOrder>,
}

/// Key-value storage for session data.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the stored data for `sid`, or `None` if absent/expired.
    async fn load(&self, sid: &str) -> Option<SessionData>;
    async fn save(&self, sid: &str, data: SessionData);
    async fn destroy(&self, sid: &str);
}

struct Entry {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// In-process session store with per-entry TTL.
pub struct InMemorySessionStore {
    entries: DashMap<String, Entry>,
    ttl: ChronoDuration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(7)),
        }
    }

    /// Number of live (non-expired) sessions; test/introspection helper.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, sid: &str) -> Option<SessionData> {
        if let Some(entry) = self.entries.get(sid) {
            if entry.expires_at > Utc::now() {
                return Some(entry.data.clone());
            }
        }
        // Expired entries are dropped lazily on access.
        self.entries.remove(sid);
        None
    }

    async fn save(&self, sid: &str, data: SessionData) {
        self.entries.insert(
            sid.to_string(),
            Entry {
                data,
                expires_at: Utc::now() + self.ttl,
            },
        );
    }

    async fn destroy(&self, sid: &str) {
        self.entries.remove(sid);
    }
}

/// Session middleware configuration shared through the router.
pub struct SessionLayer {
    pub store: Arc<dyn SessionStore>,
    pub cookie_name: String,
    pub ttl: Duration,
}

fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn cookie_value(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k.trim() == name).then(|| v.trim().to_string())
    })
}

/// Builds the `Set-Cookie` header value binding `sid` to the client.
pub fn session_cookie(name: &str, sid: &str, ttl: Duration) -> HeaderValue {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        sid,
        ttl.as_secs()
    );
    HeaderValue::from_str(&cookie).expect("session cookie is always valid ASCII")
}

/// Handle to one session: its id plus the store it lives in. Inserted
/// into request extensions by [`session_middleware`] and pulled out by the
/// extractor impl below.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    store: Arc<dyn SessionStore>,
}

impl SessionHandle {
    pub fn new(id: String, store: Arc<dyn SessionStore>) -> Self {
        Self { id, store }
    }

    pub async fn get(&self) -> SessionData {
        self.store.load(&self.id).await.unwrap_or_default()
    }

    /// Read-modify-write on the session data; returns the updated copy.
    pub async fn update<F>(&self, mutate: F) -> SessionData
    where
        F: FnOnce(&mut SessionData),
    {
        let mut data = self.get().await;
        mutate(&mut data);
        self.store.save(&self.id, data.clone()).await;
        data
    }

    pub async fn destroy(&self) {
        self.store.destroy(&self.id).await;
    }

    /// Moves this session's data under a fresh id (login fixation
    /// defense). The caller is responsible for re-binding the client via
    /// [`session_cookie`].
    pub async fn rotate(&self) -> SessionHandle {
        let data = self.get().await;
        self.store.destroy(&self.id).await;
        let fresh = SessionHandle::new(new_session_id(), self.store.clone());
        fresh.store.save(&fresh.id, data).await;
        fresh
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Binds every request to a session: reuses the cookie-carried id or mints
/// a new one, and sets the cookie on the way out for fresh sessions.
pub async fn session_middleware(
    State(layer): State<Arc<SessionLayer>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let existing = cookie_value(req.headers(), &layer.cookie_name);
    let is_new = existing.is_none();
    let sid = existing.unwrap_or_else(new_session_id);

    req.extensions_mut()
        .insert(SessionHandle::new(sid.clone(), layer.store.clone()));

    let mut response = next.run(req).await;

    // A handler that rotated the session already set its own cookie.
    let handler_set_cookie = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| {
            v.to_str()
                .map(|s| s.starts_with(&format!("{}=", layer.cookie_name)))
                .unwrap_or(false)
        });

    if is_new && !handler_set_cookie {
        response.headers_mut().append(
            header::SET_COOKIE,
            session_cookie(&layer.cookie_name, &sid, layer.ttl),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store() -> Arc<InMemorySessionStore> {
        Arc::new(InMemorySessionStore::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn load_of_unknown_session_is_none() {
        assert!(store().load("nope").await.is_none());
    }

    #[tokio::test]
    async fn update_persists_cart_lines() {
        let store = store();
        let handle = SessionHandle::new("s1".into(), store.clone());
        handle
            .update(|s| {
                s.cart.push(CartLine {
                    product_id: 1,
                    product_name: "Apples".into(),
                    unit_price: dec!(1.50),
                    quantity: 2,
                    image: None,
                })
            })
            .await;

        let data = handle.get().await;
        assert_eq!(data.cart.len(), 1);
        assert_eq!(data.cart[0].unit_price, dec!(1.50));
    }

    #[tokio::test]
    async fn rotate_moves_data_and_invalidates_old_id() {
        let store = store();
        let handle = SessionHandle::new("old".into(), store.clone());
        handle
            .update(|s| {
                s.user = Some(SessionUser {
                    username: "u".into(),
                    email: "u@example.com".into(),
                    role: "user".into(),
                    address: None,
                    contact: None,
                })
            })
            .await;

        let fresh = handle.rotate().await;
        assert_ne!(fresh.id, "old");
        assert!(store.load("old").await.is_none());
        assert!(fresh.get().await.user.is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let store = InMemorySessionStore::new(Duration::from_secs(0));
        store.save("s", SessionData::default()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.load("s").await.is_none());
    }

    #[test]
    fn cookie_header_shape() {
        let v = session_cookie("sid", "abc", Duration::from_secs(3600));
        let s = v.to_str().unwrap();
        assert!(s.starts_with("sid=abc;"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("Max-Age=3600"));
    }
}
