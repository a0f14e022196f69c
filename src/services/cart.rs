//! Session cart operations.
//!
//! Cart lines snapshot the product name, image and discount-applied unit
//! price at the time the line is added. Quantities are clamped to the
//! stock on hand at add/update time; the checkout transaction re-checks
//! stock under lock, so a clamp here is a UX courtesy, not the guarantee.

use sea_orm::EntityTrait;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    db::DbPool,
    entities::{product, Product},
    errors::ServiceError,
    services::catalog::effective_price,
    sessions::{CartLine, SessionHandle},
};

/// Result of a cart mutation: the new cart plus whether the requested
/// quantity had to be reduced to the available stock.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartMutation {
    pub cart: Vec<CartLine>,
    pub clamped: bool,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn load_product(&self, product_id: i32) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Adds `quantity` of a product to the cart, merging into an existing
    /// line for the same product. The resulting line quantity is clamped
    /// to current stock.
    #[instrument(skip(self, session))]
    pub async fn add_item(
        &self,
        session: &SessionHandle,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartMutation, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".into(),
            ));
        }
        let product = self.load_product(product_id).await?;
        if product.quantity <= 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is out of stock",
                product.name
            )));
        }

        let mut clamped = false;
        let data = session
            .update(|s| {
                if let Some(line) = s.cart.iter_mut().find(|l| l.product_id == product_id) {
                    let wanted = line.quantity.saturating_add(quantity);
                    line.quantity = wanted.min(product.quantity);
                    clamped = line.quantity < wanted;
                } else {
                    let granted = quantity.min(product.quantity);
                    clamped = granted < quantity;
                    s.cart.push(CartLine {
                        product_id,
                        product_name: product.name.clone(),
                        unit_price: effective_price(product.price, product.discount),
                        quantity: granted,
                        image: product.image.clone(),
                    });
                }
            })
            .await;

        Ok(CartMutation {
            cart: data.cart,
            clamped,
        })
    }

    /// Sets a line's quantity outright. Zero or negative removes the line.
    #[instrument(skip(self, session))]
    pub async fn update_quantity(
        &self,
        session: &SessionHandle,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartMutation, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(session, product_id).await;
        }

        let data = session.get().await;
        if !data.cart.iter().any(|l| l.product_id == product_id) {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in the cart",
                product_id
            )));
        }

        let product = self.load_product(product_id).await?;
        let granted = quantity.min(product.quantity.max(0));
        let clamped = granted < quantity;

        let data = session
            .update(|s| {
                if granted == 0 {
                    s.cart.retain(|l| l.product_id != product_id);
                } else if let Some(line) = s.cart.iter_mut().find(|l| l.product_id == product_id) {
                    line.quantity = granted;
                }
            })
            .await;

        Ok(CartMutation {
            cart: data.cart,
            clamped,
        })
    }

    #[instrument(skip(self, session))]
    pub async fn remove_item(
        &self,
        session: &SessionHandle,
        product_id: i32,
    ) -> Result<CartMutation, ServiceError> {
        let data = session
            .update(|s| s.cart.retain(|l| l.product_id != product_id))
            .await;
        Ok(CartMutation {
            cart: data.cart,
            clamped: false,
        })
    }

    pub async fn clear(&self, session: &SessionHandle) -> Result<(), ServiceError> {
        session.update(|s| s.cart.clear()).await;
        Ok(())
    }
}
