//! Password hashing and route guards.
//!
//! Authentication is cookie-session based: logging in stores a
//! [`SessionUser`] snapshot in the session, and the extractors here turn
//! that snapshot into typed handler arguments. Passwords are hashed with
//! Argon2id and verified against the stored PHC string.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};

use crate::{
    errors::{ApiError, ServiceError},
    sessions::{SessionHandle, SessionUser},
};

/// Hashes a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::HashError(e.to_string()))
}

/// Verifies a password against a stored PHC-format hash.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ServiceError::HashError(format!("stored hash unparseable: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Extractor for the signed-in user. Rejects with 401 when the session
/// carries no user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionHandle::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        match session.get().await.user {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(ApiError::Unauthorized.into_response()),
        }
    }
}

/// Extractor for admin-gated routes: a signed-in user whose role is
/// "admin". Rejects with 401 when anonymous, 403 otherwise.
#[derive(Debug, Clone)]
pub struct AdminUser(pub SessionUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.is_admin() {
            Ok(AdminUser(user))
        } else {
            Err(ApiError::Forbidden.into_response())
        }
    }
}
