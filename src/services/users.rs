//! Account registration, login verification, profile updates, and the
//! admin user panel.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::{hash_password, verify_password},
    db::DbPool,
    entities::{user, User},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 8, message = "contact must be at least 8 characters"))]
    pub contact: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, max = 100))]
    pub username: Option<String>,
    #[validate(length(min = 6))]
    pub password: Option<String>,
    #[validate(length(min = 1))]
    pub address: Option<String>,
    #[validate(length(min = 8))]
    pub contact: Option<String>,
}

/// Admin-side edit; unlike profile updates this may change email and role.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct AdminUpdateUserInput {
    #[validate(length(min = 1, max = 100))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub role: Option<String>,
    #[validate(length(min = 1))]
    pub address: Option<String>,
    #[validate(length(min = 8))]
    pub contact: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl UserService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }

    /// Creates an account with role "user". Email must be unused.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();

        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "An account with email {} already exists",
                email
            )));
        }

        let model = user::ActiveModel {
            username: Set(input.username.trim().to_string()),
            email: Set(email),
            password_hash: Set(hash_password(&input.password)?),
            address: Set(Some(input.address)),
            contact: Set(Some(input.contact)),
            role: Set("user".to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::UserRegistered {
                user_id: created.id,
                email: created.email.clone(),
            })
            .await;
        info!(user_id = created.id, "account registered");
        Ok(created)
    }

    /// Verifies credentials. The error is identical for unknown email and
    /// wrong password so login probing learns nothing.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn authenticate(&self, input: LoginInput) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();

        let user = match self.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                warn!("login attempt for unknown email");
                return Err(ServiceError::AuthError("Invalid email or password".into()));
            }
        };

        if verify_password(&input.password, &user.password_hash)? {
            Ok(user)
        } else {
            warn!(user_id = user.id, "login attempt with wrong password");
            Err(ServiceError::AuthError("Invalid email or password".into()))
        }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<user::Model, ServiceError> {
        self.find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No account for {}", email)))
    }

    /// Self-service profile update; email and role are fixed here.
    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        email: &str,
        input: UpdateProfileInput,
    ) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_by_email(email).await?;

        let mut model: user::ActiveModel = existing.into();
        if let Some(username) = input.username {
            model.username = Set(username.trim().to_string());
        }
        if let Some(password) = input.password {
            model.password_hash = Set(hash_password(&password)?);
        }
        if let Some(address) = input.address {
            model.address = Set(Some(address));
        }
        if let Some(contact) = input.contact {
            model.contact = Set(Some(contact));
        }
        Ok(model.update(&*self.db).await?)
    }

    /// Admin: all accounts, oldest first.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(User::find()
            .order_by_asc(user::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Admin: edits any account. A changed email must stay unique.
    #[instrument(skip(self, input))]
    pub async fn admin_update_user(
        &self,
        id: i32,
        input: AdminUpdateUserInput,
    ) -> Result<user::Model, ServiceError> {
        input.validate()?;
        if let Some(role) = input.role.as_deref() {
            if role != "user" && role != "admin" {
                return Err(ServiceError::ValidationError(
                    "role must be \"user\" or \"admin\"".into(),
                ));
            }
        }

        let existing = User::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))?;

        if let Some(email) = input.email.as_deref() {
            let email = email.trim().to_lowercase();
            if email != existing.email {
                if self.find_by_email(&email).await?.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "An account with email {} already exists",
                        email
                    )));
                }
            }
        }

        let mut model: user::ActiveModel = existing.into();
        if let Some(username) = input.username {
            model.username = Set(username.trim().to_string());
        }
        if let Some(email) = input.email {
            model.email = Set(email.trim().to_lowercase());
        }
        if let Some(role) = input.role {
            model.role = Set(role);
        }
        if let Some(address) = input.address {
            model.address = Set(Some(address));
        }
        if let Some(contact) = input.contact {
            model.contact = Set(Some(contact));
        }
        Ok(model.update(&*self.db).await?)
    }

    /// Admin: deletes an account. The acting admin cannot delete itself,
    /// which keeps at least one admin reachable.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: i32, acting_admin_email: &str) -> Result<(), ServiceError> {
        let target = User::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))?;

        if target.email == acting_admin_email {
            return Err(ServiceError::InvalidOperation(
                "You cannot delete your own account".into(),
            ));
        }

        User::delete_by_id(id).exec(&*self.db).await?;
        self.event_sender.send_or_log(Event::UserDeleted(id)).await;
        info!(user_id = id, "account deleted");
        Ok(())
    }
}
