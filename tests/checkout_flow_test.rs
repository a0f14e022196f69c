//! End-to-end checkout behavior against a real (in-memory) database:
//! totals, inventory decrements, and all-or-nothing rollback.

mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};

use storefront_api::{
    entities::{order, order_item, Order, OrderItem, Product},
    errors::CheckoutError,
    services::checkout::{CheckoutService, CustomerIdentity},
    sessions::CartLine,
};

fn customer() -> CustomerIdentity {
    CustomerIdentity {
        email: "shopper@example.com".to_string(),
        name: Some("Shopper".to_string()),
        address: Some("1 Market St".to_string()),
        contact: Some("555-0100".to_string()),
    }
}

fn line(product_id: i32, quantity: i32, unit_price: Decimal) -> CartLine {
    CartLine {
        product_id,
        product_name: format!("product-{product_id}"),
        unit_price,
        quantity,
        image: None,
    }
}

async fn stock_of(db: &storefront_api::db::DbPool, id: i32) -> i32 {
    Product::find_by_id(id)
        .one(db)
        .await
        .unwrap()
        .expect("product should exist")
        .quantity
}

#[tokio::test]
async fn successful_checkout_commits_order_and_decrements_stock() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let apples = common::seed_product(&db, "Apples", 5, dec!(1.50), dec!(0)).await;
    let bread = common::seed_product(&db, "Bread", 1, dec!(3.00), dec!(0)).await;

    let service = CheckoutService::new(db.clone(), events);
    let cart = vec![line(apples.id, 2, dec!(1.50)), line(bread.id, 1, dec!(3.00))];

    let placed = service.checkout(&cart, &customer()).await.unwrap();

    assert_eq!(placed.total, dec!(6.00));
    assert!(placed.order_id.starts_with("ord_"));
    assert_eq!(placed.items.len(), 2);
    assert_eq!(placed.user_email, "shopper@example.com");

    assert_eq!(stock_of(&db, apples.id).await, 3);
    assert_eq!(stock_of(&db, bread.id).await, 0);

    let header = Order::find().one(&*db).await.unwrap().unwrap();
    assert_eq!(header.order_id, placed.order_id);
    assert_eq!(header.total, dec!(6.00));
    let items = OrderItem::find().all(&*db).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_attempt() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let apples = common::seed_product(&db, "Apples", 5, dec!(1.50), dec!(0)).await;
    let bread = common::seed_product(&db, "Bread", 0, dec!(3.00), dec!(0)).await;

    let service = CheckoutService::new(db.clone(), events);
    let cart = vec![line(apples.id, 2, dec!(1.50)), line(bread.id, 1, dec!(3.00))];

    let err = service.checkout(&cart, &customer()).await.unwrap_err();
    assert_matches!(
        err,
        CheckoutError::InsufficientStock { product_id, available: 0 } if product_id == bread.id
    );

    // Nothing moved: no order rows, no item rows, untouched quantities.
    assert_eq!(Order::find().count(&*db).await.unwrap(), 0);
    assert_eq!(OrderItem::find().count(&*db).await.unwrap(), 0);
    assert_eq!(stock_of(&db, apples.id).await, 5);
    assert_eq!(stock_of(&db, bread.id).await, 0);
}

#[tokio::test]
async fn empty_cart_is_rejected_before_touching_the_database() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let service = CheckoutService::new(db.clone(), events);

    let err = service.checkout(&[], &customer()).await.unwrap_err();
    assert_matches!(err, CheckoutError::EmptyCart);
    assert_eq!(Order::find().count(&*db).await.unwrap(), 0);
}

#[tokio::test]
async fn vanished_product_aborts_and_rolls_back() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let apples = common::seed_product(&db, "Apples", 5, dec!(1.50), dec!(0)).await;

    let service = CheckoutService::new(db.clone(), events);
    let cart = vec![line(apples.id, 1, dec!(1.50)), line(9999, 1, dec!(2.00))];

    let err = service.checkout(&cart, &customer()).await.unwrap_err();
    assert_matches!(err, CheckoutError::ProductMissing { product_id: 9999 });

    assert_eq!(Order::find().count(&*db).await.unwrap(), 0);
    assert_eq!(stock_of(&db, apples.id).await, 5);
}

#[tokio::test]
async fn repeated_checkouts_never_oversell() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let milk = common::seed_product(&db, "Milk", 3, dec!(2.00), dec!(0)).await;

    let service = CheckoutService::new(db.clone(), events);

    service
        .checkout(&[line(milk.id, 2, dec!(2.00))], &customer())
        .await
        .unwrap();
    assert_eq!(stock_of(&db, milk.id).await, 1);

    let err = service
        .checkout(&[line(milk.id, 2, dec!(2.00))], &customer())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CheckoutError::InsufficientStock { available: 1, .. }
    );
    assert_eq!(stock_of(&db, milk.id).await, 1);
    assert_eq!(Order::find().count(&*db).await.unwrap(), 1);
}

#[tokio::test]
async fn write_failure_after_header_insert_rolls_back_completely() {
    use sea_orm::ConnectionTrait;

    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let apples = common::seed_product(&db, "Apples", 5, dec!(1.50), dec!(0)).await;

    // Sabotage the item insert: the stock check and the header insert
    // succeed, then writing the first line item blows up mid-transaction.
    db.execute_unprepared("DROP TABLE order_items").await.unwrap();

    let service = CheckoutService::new(db.clone(), events);
    let err = service
        .checkout(&[line(apples.id, 2, dec!(1.50))], &customer())
        .await
        .unwrap_err();
    assert_matches!(err, CheckoutError::Persistence(_));

    // The already-inserted header and the decrement were rolled back.
    assert_eq!(Order::find().count(&*db).await.unwrap(), 0);
    assert_eq!(stock_of(&db, apples.id).await, 5);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let milk = common::seed_product(&db, "Milk", 3, dec!(2.00), dec!(0)).await;

    let service = CheckoutService::new(db.clone(), events);

    let mut attempts = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let product_id = milk.id;
        attempts.push(tokio::spawn(async move {
            service
                .checkout(&[line(product_id, 1, dec!(2.00))], &customer())
                .await
        }));
    }

    let mut committed = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => committed += 1,
            Err(err) => assert_matches!(err, CheckoutError::InsufficientStock { .. }),
        }
    }

    // Exactly the stock on hand was sold, never a unit more.
    assert_eq!(committed, 3);
    assert_eq!(stock_of(&db, milk.id).await, 0);
    assert_eq!(Order::find().count(&*db).await.unwrap(), 3);
    assert_eq!(OrderItem::find().count(&*db).await.unwrap(), 3);
}

#[tokio::test]
async fn duplicate_cart_lines_merge_into_one_item() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let eggs = common::seed_product(&db, "Eggs", 5, dec!(0.40), dec!(0)).await;

    let service = CheckoutService::new(db.clone(), events);
    let cart = vec![line(eggs.id, 1, dec!(0.40)), line(eggs.id, 2, dec!(0.40))];

    let placed = service.checkout(&cart, &customer()).await.unwrap();
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].quantity, 3);
    assert_eq!(placed.total, dec!(1.20));
    assert_eq!(stock_of(&db, eggs.id).await, 2);

    let items = OrderItem::find().all(&*db).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);
}

#[tokio::test]
async fn single_line_cart_total_is_price_times_quantity() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    let tea = common::seed_product(&db, "Tea", 10, dec!(4.35), dec!(0)).await;

    let service = CheckoutService::new(db.clone(), events);
    let placed = service
        .checkout(&[line(tea.id, 3, dec!(4.35))], &customer())
        .await
        .unwrap();
    assert_eq!(placed.total, dec!(13.05));
}

#[tokio::test]
async fn large_cart_total_matches_manual_sum() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();

    let mut cart = Vec::new();
    let mut expected = Decimal::ZERO;
    for i in 0..50 {
        let price = Decimal::new(100 + i as i64, 2); // 1.00 .. 1.49
        let product = common::seed_product(&db, &format!("Item {i}"), 10, price, dec!(0)).await;
        cart.push(line(product.id, 2, price));
        expected += price * Decimal::from(2);
    }

    let service = CheckoutService::new(db.clone(), events);
    let placed = service.checkout(&cart, &customer()).await.unwrap();
    assert_eq!(placed.total, expected);
    assert_eq!(placed.items.len(), 50);
    assert_eq!(OrderItem::find().count(&*db).await.unwrap(), 50);
}

#[tokio::test]
async fn order_rows_snapshot_the_cart_prices() {
    let db = common::setup_db().await;
    let (events, _rx) = common::test_events();
    // 10% off 2.00: the cart carries the discounted snapshot.
    let juice = common::seed_product(&db, "Juice", 4, dec!(2.00), dec!(10)).await;

    let service = CheckoutService::new(db.clone(), events);
    let placed = service
        .checkout(&[line(juice.id, 2, dec!(1.80))], &customer())
        .await
        .unwrap();

    assert_eq!(placed.total, dec!(3.60));
    let item = order_item::Entity::find().one(&*db).await.unwrap().unwrap();
    assert_eq!(item.price, dec!(1.80));
    assert_eq!(item.product_name, format!("product-{}", juice.id));

    let header = order::Entity::find().one(&*db).await.unwrap().unwrap();
    assert_eq!(header.user_name.as_deref(), Some("Shopper"));
    assert_eq!(header.address.as_deref(), Some("1 Market St"));
}
