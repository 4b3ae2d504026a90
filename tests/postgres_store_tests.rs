//! PostgreSQL store tests.
//!
//! Each test gets a fresh database with the schema migrations applied. They
//! need a server reachable through `DATABASE_URL`:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/order_core_test cargo test -- --ignored
//! ```

use pet_order_core::config::OrderCoreConfig;
use pet_order_core::database::{OrderStore, PgOrderStore};
use pet_order_core::error::{ErrorKind, OrderError};
use pet_order_core::models::{FileHandle, LineItemRequest, RecordId};
use pet_order_core::services::{
    CreateOrderRequest, DeliveryAssignmentEngine, OrderService, SpecializedOrderComposer,
    SpecializedOrderRequest,
};
use pet_order_core::state_machine::{OrderStatus, TransitionTable};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const CUSTOMER: RecordId = RecordId::new(1001);
const ADDRESS: RecordId = RecordId::new(2001);
const COURIER: RecordId = RecordId::new(3001);
const PET: RecordId = RecordId::new(4001);
const DISH: RecordId = RecordId::new(5001);

async fn seed(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO customers (id, name) VALUES ($1, 'Ana')")
        .bind(CUSTOMER)
        .execute(pool)
        .await?;
    sqlx::query(
        "INSERT INTO addresses (id, customer_id, name, latitude, longitude) \
         VALUES ($1, $2, 'Home', -12.046374, -77.042793)",
    )
    .bind(ADDRESS)
    .bind(CUSTOMER)
    .execute(pool)
    .await?;
    sqlx::query("INSERT INTO couriers (id, name, phone) VALUES ($1, 'Rosa', '+51 999 000 111')")
        .bind(COURIER)
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO pets (id, customer_id, name, species) VALUES ($1, $2, 'Luna', 'dog')")
        .bind(PET)
        .bind(CUSTOMER)
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO dishes (id, name, unit_price) VALUES ($1, 'Chicken and rice', 12.50)")
        .bind(DISH)
        .execute(pool)
        .await?;
    sqlx::query(
        "INSERT INTO allergy_catalog (id, name, species) \
         VALUES (1, 'Chicken', 'dog'), (2, 'Wheat', 'dog'), (3, 'Fish', 'cat')",
    )
        .execute(pool)
        .await?;
    Ok(())
}

fn services(pool: &PgPool) -> (OrderService, DeliveryAssignmentEngine, SpecializedOrderComposer) {
    let config = Arc::new(OrderCoreConfig::default());
    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(
        pool.clone(),
        config.transactions.lock_timeout(),
    ));
    let table = Arc::new(TransitionTable::standard());
    (
        OrderService::new(store.clone(), config.clone(), table.clone()),
        DeliveryAssignmentEngine::new(store.clone(), config.clone(), table),
        SpecializedOrderComposer::new(store, config),
    )
}

fn order_request() -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: CUSTOMER,
        address_id: ADDRESS,
        line_items: vec![LineItemRequest {
            dish_id: DISH,
            quantity: 2,
        }],
        total: Decimal::new(2500, 2),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_order_lifecycle_against_postgres(pool: PgPool) -> sqlx::Result<()> {
    seed(&pool).await?;
    let (orders, delivery, _) = services(&pool);

    let created = orders.create_order(order_request()).await.unwrap();
    let fetched = orders.get_order(created.order.id).await.unwrap();
    assert_eq!(fetched.order.status, OrderStatus::Pending);
    assert_eq!(fetched.line_items.len(), 1);
    assert_eq!(fetched.line_items[0].subtotal, Decimal::new(2500, 2));

    let outcome = delivery.assign(created.order.id, COURIER).await.unwrap();
    assert_eq!(outcome.status, OrderStatus::Assigned);
    delivery.assign(created.order.id, COURIER).await.unwrap();
    let controls: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM delivery_controls WHERE order_id = $1")
            .bind(created.order.id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(controls, 1);

    let confirmed = delivery.confirm_delivery(created.order.id).await.unwrap();
    assert_eq!(confirmed.status, OrderStatus::Delivered);
    assert!(delivery.confirm_delivery(created.order.id).await.unwrap().unchanged);

    let err = orders
        .transition(created.order.id, OrderStatus::Returned)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_locked_order_yields_conflict(pool: PgPool) -> sqlx::Result<()> {
    seed(&pool).await?;
    let (orders, _, _) = services(&pool);
    let created = orders.create_order(order_request()).await.unwrap();

    let store = PgOrderStore::new(pool.clone(), Duration::from_millis(100));
    let mut holder = store.begin().await.unwrap();
    holder.lock_order(created.order.id).await.unwrap();

    let mut contender = store.begin().await.unwrap();
    let err = contender.lock_order(created.order.id).await.unwrap_err();
    assert!(matches!(err, OrderError::Conflict { .. }));
    assert!(err.is_retryable());

    drop(contender);
    drop(holder);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_unknown_stored_status_is_invariant_violation(pool: PgPool) -> sqlx::Result<()> {
    seed(&pool).await?;
    let (orders, _, _) = services(&pool);
    let created = orders.create_order(order_request()).await.unwrap();

    sqlx::query("ALTER TABLE orders DROP CONSTRAINT orders_status_check")
        .execute(&pool)
        .await?;
    sqlx::query("UPDATE orders SET status = 'shipped' WHERE id = $1")
        .bind(created.order.id)
        .execute(&pool)
        .await?;

    let err = orders
        .transition(created.order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert!(!err.is_retryable());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_composition_rolls_back_on_malformed_input(pool: PgPool) -> sqlx::Result<()> {
    seed(&pool).await?;
    let (_, _, composer) = services(&pool);

    let request = SpecializedOrderRequest {
        customer_id: CUSTOMER,
        pet_id: PET,
        feeding_frequency: "Twice a day".to_string(),
        diet_objective: "Weight control".to_string(),
        additional_instructions: None,
        requires_nutritionist: true,
        allergy_ids: Some("[1, 1, 2]".to_string()),
        conditions: Some("[\"Otitis\"]".to_string()),
        preferences: None,
        allergy_description: Some("Itchy skin".to_string()),
        prescription_file: Some(FileHandle::new("rx/luna.pdf")),
        supplementary_file: None,
    };

    let created = composer.create_specialized_order(request.clone()).await.unwrap();
    assert_eq!(created.summary.allergies.recorded, 2);
    assert_eq!(created.summary.allergies.skipped, 1);

    let details = composer.get_specialized_order(created.order_id).await.unwrap();
    assert_eq!(details.profile.allergies.len(), 2);
    assert!(details.prescription.is_some());

    let mut broken = request;
    broken.conditions = Some("[{".to_string());
    let err = composer.create_specialized_order(broken).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "conditions"));

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE customer_id = $1")
        .bind(CUSTOMER)
        .fetch_one(&pool)
        .await?;
    assert_eq!(orders, 1);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_identifier_beyond_bigint_range_is_not_found(pool: PgPool) -> sqlx::Result<()> {
    seed(&pool).await?;
    let (orders, delivery, composer) = services(&pool);
    let huge: RecordId = serde_json::from_str("\"18446744073709551615\"").unwrap();

    let err = orders.get_order(huge).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = delivery.assign(huge, COURIER).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = delivery.courier_history(huge).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = composer.list_specialized_orders(huge).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_amount_beyond_numeric_range_is_validation_error(pool: PgPool) -> sqlx::Result<()> {
    seed(&pool).await?;
    sqlx::query("INSERT INTO dishes (id, name, unit_price) VALUES (5002, 'Banquet', 60000000.00)")
        .execute(&pool)
        .await?;
    let (orders, _, _) = services(&pool);

    let err = orders
        .create_order(CreateOrderRequest {
            customer_id: CUSTOMER,
            address_id: ADDRESS,
            line_items: vec![LineItemRequest {
                dish_id: RecordId::new(5002),
                quantity: 2,
            }],
            total: Decimal::new(12_000_000_000, 2),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "total"));

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await?;
    assert_eq!(stored, 0);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_allergy_of_another_species_is_not_recorded(pool: PgPool) -> sqlx::Result<()> {
    seed(&pool).await?;
    let (_, _, composer) = services(&pool);

    let request = SpecializedOrderRequest {
        customer_id: CUSTOMER,
        pet_id: PET,
        feeding_frequency: "Twice a day".to_string(),
        diet_objective: "Weight control".to_string(),
        additional_instructions: None,
        requires_nutritionist: false,
        allergy_ids: Some("[1, 3]".to_string()),
        conditions: None,
        preferences: None,
        allergy_description: None,
        prescription_file: None,
        supplementary_file: None,
    };
    let err = composer.create_specialized_order(request).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound { entity: "allergy", .. }));

    let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pet_allergies WHERE pet_id = $1")
        .bind(PET)
        .fetch_one(&pool)
        .await?;
    assert_eq!(recorded, 0);
    Ok(())
}
