//! Product catalog: browsing with filters, effective pricing, and the
//! admin-side CRUD.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{product, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::checkout::round_money,
};

/// Storefront's fixed category set, merged with whatever exists in the
/// catalog column.
pub const STATIC_CATEGORIES: [&str; 5] = ["Fruits", "Vegetables", "Drinks", "Snacks", "Others"];

/// Browse filters. A reversed price range is swapped rather than rejected.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProductFilter {
    /// Exact category match; `None` or "All" lists everything
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    pub price: Option<Decimal>,
    pub discount: Option<Decimal>,
}

/// Unit price after the product-level percentage discount, rounded to 2dp.
/// This is the price the cart snapshots.
pub fn effective_price(price: Decimal, discount_percent: Decimal) -> Decimal {
    let factor = Decimal::ONE - discount_percent / Decimal::from(100);
    round_money(price * factor)
}

fn validate_pricing(price: Decimal, discount: Decimal) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "price must not be negative".into(),
        ));
    }
    if discount < Decimal::ZERO || discount > Decimal::from(100) {
        return Err(ServiceError::ValidationError(
            "discount must be between 0 and 100".into(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Lists products matching the filter, newest first, with the total
    /// count for pagination.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let (min_price, max_price) = match (filter.min_price, filter.max_price) {
            (Some(lo), Some(hi)) if lo > hi => (Some(hi), Some(lo)),
            other => other,
        };

        let mut query = Product::find();
        if let Some(category) = filter.category.as_deref() {
            if !category.eq_ignore_ascii_case("all") && !category.trim().is_empty() {
                query = query.filter(product::Column::Category.eq(category.trim()));
            }
        }
        if let Some(lo) = min_price {
            query = query.filter(product::Column::Price.gte(lo));
        }
        if let Some(hi) = max_price {
            query = query.filter(product::Column::Price.lte(hi));
        }

        let per_page = filter.per_page.clamp(1, 100);
        let paginator = query
            .order_by_desc(product::Column::Id)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator
            .fetch_page(filter.page.saturating_sub(1))
            .await?;
        Ok((items, total))
    }

    pub async fn get_product(&self, id: i32) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    /// Distinct non-empty catalog categories merged with the static set.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<String>, ServiceError> {
        let db_categories: Vec<Option<String>> = Product::find()
            .select_only()
            .column(product::Column::Category)
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut categories: Vec<String> = STATIC_CATEGORIES.iter().map(|s| s.to_string()).collect();
        for category in db_categories.into_iter().flatten() {
            let trimmed = category.trim();
            if !trimmed.is_empty() && !categories.iter().any(|c| c.eq_ignore_ascii_case(trimmed)) {
                categories.push(trimmed.to_string());
            }
        }
        Ok(categories)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        validate_pricing(input.price, input.discount)?;

        let model = product::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            category: Set(input.category),
            image: Set(input.image),
            quantity: Set(input.quantity),
            price: Set(round_money(input.price)),
            discount: Set(input.discount),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        };
        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        info!(product_id = created.id, "product created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: i32,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_product(id).await?;

        let price = input.price.unwrap_or(existing.price);
        let discount = input.discount.unwrap_or(existing.discount);
        validate_pricing(price, discount)?;

        let mut model: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name);
        }
        if let Some(description) = input.description {
            model.description = Set(Some(description));
        }
        if let Some(category) = input.category {
            model.category = Set(Some(category));
        }
        if let Some(image) = input.image {
            model.image = Set(Some(image));
        }
        if let Some(quantity) = input.quantity {
            model.quantity = Set(quantity);
        }
        model.price = Set(round_money(price));
        model.discount = Set(discount);
        model.updated_at = Set(Some(Utc::now()));

        let updated = model.update(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Deletes a product. Historical orders keep their snapshots, so this
    /// never rewrites order history.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i32) -> Result<(), ServiceError> {
        let result = Product::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        self.event_sender
            .send_or_log(Event::ProductDeleted(id))
            .await;
        info!(product_id = id, "product deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn effective_price_applies_percentage_discount() {
        assert_eq!(effective_price(dec!(10.00), dec!(10)), dec!(9.00));
        assert_eq!(effective_price(dec!(1.50), dec!(0)), dec!(1.50));
        assert_eq!(effective_price(dec!(3.33), dec!(50)), dec!(1.67));
        assert_eq!(effective_price(dec!(5.00), dec!(100)), dec!(0.00));
    }

    #[test]
    fn pricing_validation_bounds() {
        assert!(validate_pricing(dec!(1.00), dec!(0)).is_ok());
        assert!(validate_pricing(dec!(1.00), dec!(100)).is_ok());
        assert!(validate_pricing(dec!(-0.01), dec!(0)).is_err());
        assert!(validate_pricing(dec!(1.00), dec!(101)).is_err());
        assert!(validate_pricing(dec!(1.00), dec!(-5)).is_err());
    }
}
