use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order line item. Name, price and image are snapshots taken at checkout,
/// so later product edits or deletion never rewrite order history.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "order_items")]
#[schema(as = OrderItem)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_id_fk: i32,
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
    /// Unit price snapshot, discount already applied
    pub price: Decimal,
    pub image: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderIdFk",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
