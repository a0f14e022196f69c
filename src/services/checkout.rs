//! The checkout transaction: atomically validates stock, persists an order
//! with its line items, and decrements inventory.
//!
//! Correctness rests entirely on database transaction isolation plus
//! row-level locks. Product rows are re-read under `SELECT ... FOR UPDATE`
//! in ascending product-id order, so two concurrent checkouts of the same
//! product serialize on the locked row and lock acquisition cannot
//! deadlock on reversed order. No unrelated work runs while the
//! transaction is open.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    DbBackend, DbErr, EntityTrait, QueryFilter, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{order, order_item, product, Product},
    errors::CheckoutError,
    events::{Event, EventSender},
    sessions::{CartLine, SessionUser},
};

/// Who is buying. Email is required (checkout sits behind login); the
/// remaining fields are persisted as-is on the order header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub email: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
}

impl From<&SessionUser> for CustomerIdentity {
    fn from(user: &SessionUser) -> Self {
        Self {
            email: user.email.clone(),
            name: Some(user.username.clone()),
            address: user.address.clone(),
            contact: user.contact.clone(),
        }
    }
}

/// One purchased line on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PlacedItem {
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub image: Option<String>,
}

/// Receipt of a committed checkout, returned to the caller and kept as the
/// session's last purchase.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PlacedOrder {
    pub order_id: String,
    pub user_email: String,
    pub total: Decimal,
    pub items: Vec<PlacedItem>,
    pub created_at: DateTime<Utc>,
}

/// Stock reservation check: pure, side-effect free. Used under the row
/// lock inside the transaction and reusable for optimistic pre-checks.
pub fn check_reservation(
    product_id: i32,
    requested: i32,
    available: i32,
) -> Result<(), CheckoutError> {
    if requested > available {
        Err(CheckoutError::InsufficientStock {
            product_id,
            available,
        })
    } else {
        Ok(())
    }
}

/// Rounds a money amount to two decimal places with standard
/// (midpoint-away-from-zero) rounding, never truncation. The result is
/// rescaled to exactly two places so serialized money reads "3.00", not
/// "3.0", regardless of the scale the database handed back.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Generates an opaque, globally unique order identifier.
pub fn new_order_id() -> String {
    format!("ord_{}", Uuid::new_v4().simple())
}

/// Collapses duplicate product lines (quantities summed, first snapshot
/// wins) and sorts ascending by product id — the lock acquisition order.
fn normalize_lines(cart: &[CartLine]) -> Vec<CartLine> {
    let mut lines: Vec<CartLine> = Vec::with_capacity(cart.len());
    for line in cart {
        match lines.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => lines.push(line.clone()),
        }
    }
    lines.sort_by_key(|l| l.product_id);
    lines
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CheckoutService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Runs the whole checkout inside one transaction. On any failure the
    /// transaction is rolled back and the database is exactly as it was
    /// before the attempt; the caller keeps the cart for retry.
    #[instrument(skip(self, cart), fields(lines = cart.len(), customer = %customer.email))]
    pub async fn checkout(
        &self,
        cart: &[CartLine],
        customer: &CustomerIdentity,
    ) -> Result<PlacedOrder, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let lines = normalize_lines(cart);

        let txn = self.db.begin().await?;
        match self.place_order(&txn, &lines, customer).await {
            Ok(placed) => {
                txn.commit().await?;
                self.event_sender
                    .send_or_log(Event::OrderPlaced {
                        order_id: placed.order_id.clone(),
                        user_email: placed.user_email.clone(),
                        total: placed.total,
                        item_count: placed.items.len(),
                    })
                    .await;
                info!(order_id = %placed.order_id, total = %placed.total, "checkout committed");
                Ok(placed)
            }
            Err(err) => {
                // Rollback failure is secondary; the original error is the
                // one the caller needs.
                let _ = txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn place_order(
        &self,
        txn: &DatabaseTransaction,
        lines: &[CartLine],
        customer: &CustomerIdentity,
    ) -> Result<PlacedOrder, CheckoutError> {
        // Re-read every product under lock and verify stock before writing
        // anything.
        for line in lines {
            let product = self
                .find_for_update(txn, line.product_id)
                .await?
                .ok_or(CheckoutError::ProductMissing {
                    product_id: line.product_id,
                })?;
            check_reservation(line.product_id, line.quantity, product.quantity)?;
        }

        let total = round_money(
            lines
                .iter()
                .map(|l| l.unit_price * Decimal::from(l.quantity))
                .sum(),
        );
        let order_id = new_order_id();
        let created_at = Utc::now();

        let header = order::ActiveModel {
            order_id: Set(order_id.clone()),
            user_email: Set(customer.email.clone()),
            user_name: Set(customer.name.clone()),
            address: Set(customer.address.clone()),
            contact: Set(customer.contact.clone()),
            total: Set(total),
            created_at: Set(created_at),
            ..Default::default()
        };
        let header = header.insert(txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                CheckoutError::IdentifierCollision
            } else {
                CheckoutError::Persistence(e)
            }
        })?;

        for line in lines {
            let item = order_item::ActiveModel {
                order_id_fk: Set(header.id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                quantity: Set(line.quantity),
                price: Set(line.unit_price),
                image: Set(line.image.clone()),
                ..Default::default()
            };
            item.insert(txn).await?;
        }

        // Decrement inside the same lock scope as the stock check, so no
        // concurrent purchase can oversell between check and decrement.
        for line in lines {
            Product::update_many()
                .col_expr(
                    product::Column::Quantity,
                    Expr::col(product::Column::Quantity).sub(line.quantity),
                )
                .col_expr(
                    product::Column::UpdatedAt,
                    Expr::value(Some(Utc::now())),
                )
                .filter(product::Column::Id.eq(line.product_id))
                .exec(txn)
                .await?;
        }

        Ok(PlacedOrder {
            order_id,
            user_email: customer.email.clone(),
            total,
            items: lines
                .iter()
                .map(|l| PlacedItem {
                    product_id: l.product_id,
                    product_name: l.product_name.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    image: l.image.clone(),
                })
                .collect(),
            created_at,
        })
    }

    /// Row-lock read of one product. SQLite has no `FOR UPDATE` clause;
    /// its single-writer model already serializes the transaction.
    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        product_id: i32,
    ) -> Result<Option<product::Model>, DbErr> {
        let mut query = Product::find_by_id(product_id);
        if self.db.get_database_backend() != DbBackend::Sqlite {
            query = query.lock_exclusive();
        }
        query.one(txn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn line(product_id: i32, qty: i32, price: Decimal) -> CartLine {
        CartLine {
            product_id,
            product_name: format!("product-{product_id}"),
            unit_price: price,
            quantity: qty,
            image: None,
        }
    }

    #[rstest]
    #[case(1, 1, true)]
    #[case(5, 5, true)]
    #[case(0, 0, true)]
    #[case(6, 5, false)]
    #[case(1, 0, false)]
    fn reservation_check(#[case] requested: i32, #[case] available: i32, #[case] ok: bool) {
        let result = check_reservation(9, requested, available);
        assert_eq!(result.is_ok(), ok);
        if !ok {
            assert_matches!(
                result,
                Err(CheckoutError::InsufficientStock {
                    product_id: 9,
                    available: a
                }) if a == available
            );
        }
    }

    #[test]
    fn money_rounds_midpoint_away_from_zero() {
        assert_eq!(round_money(dec!(2.005)), dec!(2.01));
        assert_eq!(round_money(dec!(2.004)), dec!(2.00));
        assert_eq!(round_money(dec!(6.00)), dec!(6.00));
        // truncation would give 1.01 here
        assert_eq!(round_money(dec!(1.0150)), dec!(1.02));
    }

    #[test]
    fn money_always_carries_two_decimal_places() {
        // SQLite returns decimals at minimal scale; money must still
        // serialize with cents.
        assert_eq!(round_money(dec!(3.0)).to_string(), "3.00");
        assert_eq!(round_money(dec!(6)).to_string(), "6.00");
        assert_eq!(round_money(dec!(1.5) * Decimal::from(2)).to_string(), "3.00");
        assert_eq!(round_money(dec!(0)).scale(), 2);
    }

    #[tokio::test]
    async fn duplicate_order_identifiers_are_classified_as_unique_violations() {
        use sea_orm_migration::MigratorTrait;

        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        crate::migrator::Migrator::up(&db, None).await.unwrap();

        let header = |oid: &str| order::ActiveModel {
            order_id: Set(oid.to_string()),
            user_email: Set("a@example.com".to_string()),
            user_name: Set(None),
            address: Set(None),
            contact: Set(None),
            total: Set(dec!(1.00)),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        header("ord_dup").insert(&db).await.unwrap();
        let err = header("ord_dup").insert(&db).await.unwrap_err();
        assert!(is_unique_violation(&err));

        let unrelated = DbErr::Custom("connection reset".into());
        assert!(!is_unique_violation(&unrelated));
    }

    #[test]
    fn normalize_merges_duplicates_and_sorts() {
        let cart = vec![
            line(3, 1, dec!(2.00)),
            line(1, 2, dec!(1.50)),
            line(3, 4, dec!(2.00)),
        ];
        let normalized = normalize_lines(&cart);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].product_id, 1);
        assert_eq!(normalized[1].product_id, 3);
        assert_eq!(normalized[1].quantity, 5);
    }

    #[test]
    fn order_ids_unique_over_ten_thousand() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(new_order_id()), "duplicate order id generated");
        }
    }

    #[test]
    fn order_id_is_opaque_and_prefixed() {
        let id = new_order_id();
        assert!(id.starts_with("ord_"));
        assert_eq!(id.len(), 4 + 32);
    }

    proptest! {
        // Normalization never changes per-product quantity totals and
        // always yields lines sorted by product id.
        #[test]
        fn normalize_preserves_quantities(
            raw in proptest::collection::vec((1i32..20, 1i32..10), 0..30)
        ) {
            let cart: Vec<CartLine> =
                raw.iter().map(|(id, q)| line(*id, *q, dec!(1.00))).collect();
            let normalized = normalize_lines(&cart);

            for window in normalized.windows(2) {
                prop_assert!(window[0].product_id < window[1].product_id);
            }
            for (id, _) in &raw {
                let before: i32 = cart
                    .iter()
                    .filter(|l| l.product_id == *id)
                    .map(|l| l.quantity)
                    .sum();
                let after: i32 = normalized
                    .iter()
                    .filter(|l| l.product_id == *id)
                    .map(|l| l.quantity)
                    .sum();
                prop_assert_eq!(before, after);
            }
        }

        // The total is the rounded sum of price × quantity for arbitrary
        // cart compositions.
        #[test]
        fn totals_match_manual_sum(
            raw in proptest::collection::vec((1u32..10_000, 1i32..50), 1..50)
        ) {
            let cart: Vec<CartLine> = raw
                .iter()
                .enumerate()
                .map(|(i, (cents, q))| {
                    line(i as i32 + 1, *q, Decimal::new(*cents as i64, 2))
                })
                .collect();
            let expected: Decimal = cart
                .iter()
                .map(|l| l.unit_price * Decimal::from(l.quantity))
                .sum();
            prop_assert_eq!(round_money(expected), expected.round_dp(2));
        }
    }
}
