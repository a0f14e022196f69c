//! Order history and the admin order panel. Orders are immutable once
//! placed; the only mutation here is the admin delete, which cascades to
//! the line items.

use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    db::DbPool,
    entities::{order, order_item, Order},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// An order header with its line items, as served to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn with_items(&self, orders: Vec<order::Model>) -> Result<Vec<OrderWithItems>, ServiceError> {
        let mut out = Vec::with_capacity(orders.len());
        for header in orders {
            let items = header
                .find_related(order_item::Entity)
                .all(&*self.db)
                .await?;
            out.push(OrderWithItems {
                order: header,
                items,
            });
        }
        Ok(out)
    }

    /// All orders placed by `email`, newest first, with line items.
    #[instrument(skip(self))]
    pub async fn history_for(&self, email: &str) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserEmail.eq(email))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        self.with_items(orders).await
    }

    /// Looks up one order by its public id. Non-admin callers only see
    /// their own orders.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: &str,
        requester_email: &str,
        is_admin: bool,
    ) -> Result<OrderWithItems, ServiceError> {
        let header = Order::find()
            .filter(order::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !is_admin && header.user_email != requester_email {
            return Err(ServiceError::Forbidden(
                "Order belongs to another account".into(),
            ));
        }

        let items = header
            .find_related(order_item::Entity)
            .all(&*self.db)
            .await?;
        Ok(OrderWithItems {
            order: header,
            items,
        })
    }

    /// The caller's most recent order, if any. Backs the purchase
    /// confirmation view when the session receipt is gone.
    #[instrument(skip(self))]
    pub async fn latest_for(&self, email: &str) -> Result<Option<OrderWithItems>, ServiceError> {
        let header = Order::find()
            .filter(order::Column::UserEmail.eq(email))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .one(&*self.db)
            .await?;
        match header {
            Some(header) => {
                let items = header
                    .find_related(order_item::Entity)
                    .all(&*self.db)
                    .await?;
                Ok(Some(OrderWithItems {
                    order: header,
                    items,
                }))
            }
            None => Ok(None),
        }
    }

    /// Admin: every order in the system, newest first.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;
        self.with_items(orders).await
    }

    /// Admin: deletes an order by public id. Line items go with it via
    /// the FK cascade. Stock is not restored.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: &str) -> Result<(), ServiceError> {
        let result = Order::delete_many()
            .filter(order::Column::OrderId.eq(order_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        self.event_sender
            .send_or_log(Event::OrderDeleted(order_id.to_string()))
            .await;
        info!(order_id, "order deleted");
        Ok(())
    }
}
