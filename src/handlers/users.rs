//! Registration, login, logout, and profile management.
//!
//! Login rotates the session id and sets the cookie itself, so a session
//! id handed out before authentication never survives into the signed-in
//! session.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;

use crate::{
    auth::CurrentUser,
    entities::user,
    errors::ApiError,
    services::users::{LoginInput, RegisterInput, UpdateProfileInput},
    sessions::{session_cookie, SessionHandle, SessionUser},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(profile))
        .route("/auth/me", put(update_profile))
}

fn session_user(model: &user::Model) -> SessionUser {
    SessionUser {
        username: model.username.clone(),
        email: model.email.clone(),
        role: model.role.clone(),
        address: model.address.clone(),
        contact: model.contact.clone(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created", body = user::Model),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<user::Model>), ApiError> {
    let created = state.users.register(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Signed in; session cookie rotated", body = SessionUser),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
    Json(input): Json<LoginInput>,
) -> Result<Response, ApiError> {
    let account = state.users.authenticate(input).await?;
    let snapshot = session_user(&account);

    // Sign the existing session in (keeping any pre-login cart), then move
    // it under a fresh id.
    session
        .update(|s| s.user = Some(snapshot.clone()))
        .await;
    let fresh = session.rotate().await;

    let cookie = session_cookie(
        &state.sessions.cookie_name,
        &fresh.id,
        state.sessions.ttl,
    );
    Ok(([(header::SET_COOKIE, cookie)], Json(snapshot)).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Session destroyed")),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: SessionHandle,
) -> Result<Response, ApiError> {
    session.destroy().await;
    // Expire the cookie client-side as well.
    let cookie = session_cookie(
        &state.sessions.cookie_name,
        "",
        std::time::Duration::from_secs(0),
    );
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The signed-in account", body = user::Model),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<user::Model>, ApiError> {
    Ok(Json(state.users.get_by_email(&user.email).await?))
}

#[utoipa::path(
    put,
    path = "/auth/me",
    request_body = UpdateProfileInput,
    responses(
        (status = 200, description = "Updated account", body = user::Model),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    session: SessionHandle,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Json<user::Model>, ApiError> {
    let updated = state.users.update_profile(&user.email, input).await?;
    // Keep the session snapshot in step with the account.
    let snapshot = session_user(&updated);
    session.update(|s| s.user = Some(snapshot)).await;
    Ok(Json(updated))
}
