//! # PostgreSQL Store
//!
//! `OrderStore` backed by a `PgPool`. A unit of work is one database
//! transaction with `lock_timeout` set locally, so a writer blocked on another
//! writer's order row gives up with a conflict instead of waiting forever.
//! Keys above `i64::MAX` cannot name a stored row and read as absent.

use super::store::{OrderStore, UnitOfWork};
use crate::error::{conflict, invariant_violation, OrderError, OrderResult};
use crate::models::{
    Address, AllergyCatalogEntry, AllergyDescription, Courier, DeliveryControl, DietaryPreference, Dish,
    HealthCondition, MedicalPrescription, Order, OrderFilter, OrderLineItem, Payment, Pet,
    PetAllergy, PetHealthProfile, RecordId, SpecializedOrder,
};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;

const ORDER_COLUMNS: &str =
    "id, customer_id, created_at, total, address_id, includes_dishes, status";
const SPECIALIZED_COLUMNS: &str = "id, order_id, pet_id, feeding_frequency, diet_objective, \
     additional_instructions, requires_nutritionist, supplementary_file";
const CONTROL_COLUMNS: &str = "id, order_id, courier_id, updated_at, delivery_confirmed";

/// SQLSTATE codes reported as conflicts
const CONFLICT_CODES: &[&str] = &[
    "55P03", // lock_not_available
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "23505", // unique_violation
];

/// Raw `orders` row. The status column is decoded separately so an unknown
/// value surfaces as an invariant violation.
#[derive(Debug, FromRow)]
struct OrderRow {
    id: RecordId,
    customer_id: RecordId,
    created_at: DateTime<Utc>,
    total: Decimal,
    address_id: Option<RecordId>,
    includes_dishes: bool,
    status: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderError;

    fn try_from(row: OrderRow) -> OrderResult<Self> {
        let status = row.status.parse::<OrderStatus>().map_err(|_| {
            invariant_violation(format!(
                "order {} has unknown stored status '{}'",
                row.id, row.status
            ))
        })?;
        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            created_at: row.created_at,
            total: row.total,
            address_id: row.address_id,
            includes_dishes: row.includes_dishes,
            status,
        })
    }
}

/// Translate a database error, reporting lock and uniqueness failures as
/// conflicts on `resource`
fn map_db_error(resource: impl Into<String>) -> impl FnOnce(sqlx::Error) -> OrderError {
    let resource = resource.into();
    move |err| {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned());
        match code {
            Some(code) if CONFLICT_CODES.contains(&code.as_str()) => {
                conflict(resource, format!("database reported {code}: {err}"))
            }
            _ => OrderError::Storage(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgOrderStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> OrderResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await.map_err(map_db_error("database"))?;
        // SET does not accept bind parameters
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(map_db_error("database"))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn health_check(&self) -> OrderResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error("database"))?;
        Ok(())
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn customer_exists(&mut self, customer_id: RecordId) -> OrderResult<bool> {
        if !customer_id.is_storable() {
            return Ok(false);
        }
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1)",
        )
        .bind(customer_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn find_address(&mut self, address_id: RecordId) -> OrderResult<Option<Address>> {
        if !address_id.is_storable() {
            return Ok(None);
        }
        let address = sqlx::query_as::<_, Address>(
            "SELECT id, customer_id, name, reference, latitude, longitude \
             FROM addresses WHERE id = $1",
        )
        .bind(address_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(address)
    }

    async fn find_courier(&mut self, courier_id: RecordId) -> OrderResult<Option<Courier>> {
        if !courier_id.is_storable() {
            return Ok(None);
        }
        let courier =
            sqlx::query_as::<_, Courier>("SELECT id, name, phone FROM couriers WHERE id = $1")
                .bind(courier_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(courier)
    }

    async fn find_pet(&mut self, pet_id: RecordId) -> OrderResult<Option<Pet>> {
        if !pet_id.is_storable() {
            return Ok(None);
        }
        let pet = sqlx::query_as::<_, Pet>(
            "SELECT id, customer_id, name, species FROM pets WHERE id = $1",
        )
        .bind(pet_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(pet)
    }

    async fn find_dish(&mut self, dish_id: RecordId) -> OrderResult<Option<Dish>> {
        if !dish_id.is_storable() {
            return Ok(None);
        }
        let dish =
            sqlx::query_as::<_, Dish>("SELECT id, name, unit_price FROM dishes WHERE id = $1")
                .bind(dish_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(dish)
    }

    async fn find_allergy(
        &mut self,
        allergy_id: RecordId,
    ) -> OrderResult<Option<AllergyCatalogEntry>> {
        if !allergy_id.is_storable() {
            return Ok(None);
        }
        let entry = sqlx::query_as::<_, AllergyCatalogEntry>(
            "SELECT id, name, species FROM allergy_catalog WHERE id = $1",
        )
        .bind(allergy_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(entry)
    }

    async fn find_order(&mut self, order_id: RecordId) -> OrderResult<Option<Order>> {
        if !order_id.is_storable() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn lock_order(&mut self, order_id: RecordId) -> OrderResult<Option<Order>> {
        if !order_id.is_storable() {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("order {order_id}")))?;
        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> OrderResult<Vec<Order>> {
        if filter.customer_id.is_some_and(|id| !id.is_storable()) {
            return Ok(Vec::new());
        }
        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(customer_id) = filter.customer_id {
            query.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(from) = filter.created_from {
            query.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.created_to {
            query.push(" AND created_at <= ").push_bind(to);
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let rows: Vec<OrderRow> = query.build_query_as().fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn line_items(&mut self, order_id: RecordId) -> OrderResult<Vec<OrderLineItem>> {
        if !order_id.is_storable() {
            return Ok(Vec::new());
        }
        let items = sqlx::query_as::<_, OrderLineItem>(
            "SELECT id, order_id, dish_id, quantity, unit_price, subtotal \
             FROM order_line_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(items)
    }

    async fn find_payment(&mut self, order_id: RecordId) -> OrderResult<Option<Payment>> {
        if !order_id.is_storable() {
            return Ok(None);
        }
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT id, order_id, amount, paid_at, status, gateway, reference \
             FROM payments WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(payment)
    }

    async fn insert_order(&mut self, order: &Order) -> OrderResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, customer_id, created_at, total, address_id, includes_dishes, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.created_at)
        .bind(order.total)
        .bind(order.address_id)
        .bind(order.includes_dishes)
        .bind(order.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("order {}", order.id)))?;
        Ok(())
    }

    async fn insert_line_item(&mut self, item: &OrderLineItem) -> OrderResult<()> {
        sqlx::query(
            "INSERT INTO order_line_items (id, order_id, dish_id, quantity, unit_price, subtotal) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.dish_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.subtotal)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("order {}", item.order_id)))?;
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: RecordId,
        status: OrderStatus,
    ) -> OrderResult<()> {
        if !order_id.is_storable() {
            return Err(crate::error::not_found("order", order_id));
        }
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error(format!("order {order_id}")))?;
        if result.rows_affected() == 0 {
            return Err(crate::error::not_found("order", order_id));
        }
        Ok(())
    }

    async fn find_delivery_control(
        &mut self,
        order_id: RecordId,
    ) -> OrderResult<Option<DeliveryControl>> {
        if !order_id.is_storable() {
            return Ok(None);
        }
        let control = sqlx::query_as::<_, DeliveryControl>(&format!(
            "SELECT {CONTROL_COLUMNS} FROM delivery_controls WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(control)
    }

    async fn list_delivery_controls(
        &mut self,
        courier_id: Option<RecordId>,
    ) -> OrderResult<Vec<DeliveryControl>> {
        if courier_id.is_some_and(|id| !id.is_storable()) {
            return Ok(Vec::new());
        }
        let controls = sqlx::query_as::<_, DeliveryControl>(&format!(
            "SELECT {CONTROL_COLUMNS} FROM delivery_controls \
             WHERE $1::BIGINT IS NULL OR courier_id = $1"
        ))
        .bind(courier_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(controls)
    }

    async fn insert_delivery_control(&mut self, control: &DeliveryControl) -> OrderResult<()> {
        sqlx::query(&format!(
            "INSERT INTO delivery_controls ({CONTROL_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(control.id)
        .bind(control.order_id)
        .bind(control.courier_id)
        .bind(control.updated_at)
        .bind(control.delivery_confirmed)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("order {}", control.order_id)))?;
        Ok(())
    }

    async fn update_delivery_control(&mut self, control: &DeliveryControl) -> OrderResult<()> {
        let result = sqlx::query(
            "UPDATE delivery_controls \
             SET courier_id = $2, updated_at = $3, delivery_confirmed = $4 WHERE id = $1",
        )
        .bind(control.id)
        .bind(control.courier_id)
        .bind(control.updated_at)
        .bind(control.delivery_confirmed)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("order {}", control.order_id)))?;
        if result.rows_affected() == 0 {
            return Err(crate::error::not_found("delivery control", control.id));
        }
        Ok(())
    }

    async fn find_specialized_order(
        &mut self,
        order_id: RecordId,
    ) -> OrderResult<Option<SpecializedOrder>> {
        if !order_id.is_storable() {
            return Ok(None);
        }
        let specialized = sqlx::query_as::<_, SpecializedOrder>(&format!(
            "SELECT {SPECIALIZED_COLUMNS} FROM specialized_orders WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(specialized)
    }

    async fn list_specialized_orders(
        &mut self,
        customer_id: RecordId,
    ) -> OrderResult<Vec<(Order, SpecializedOrder)>> {
        if !customer_id.is_storable() {
            return Ok(Vec::new());
        }
        let specialized = sqlx::query_as::<_, SpecializedOrder>(
            "SELECT s.id, s.order_id, s.pet_id, s.feeding_frequency, s.diet_objective, \
                    s.additional_instructions, s.requires_nutritionist, s.supplementary_file \
             FROM specialized_orders s JOIN orders o ON o.id = s.order_id \
             WHERE o.customer_id = $1 ORDER BY o.created_at DESC, o.id DESC",
        )
        .bind(customer_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut listed = Vec::with_capacity(specialized.len());
        for extension in specialized {
            let order = self.find_order(extension.order_id).await?.ok_or_else(|| {
                invariant_violation(format!(
                    "specialized order {} references missing order {}",
                    extension.id, extension.order_id
                ))
            })?;
            listed.push((order, extension));
        }
        Ok(listed)
    }

    async fn pet_allergy_ids(&mut self, pet_id: RecordId) -> OrderResult<Vec<RecordId>> {
        if !pet_id.is_storable() {
            return Ok(Vec::new());
        }
        let ids = sqlx::query_scalar::<_, RecordId>(
            "SELECT allergy_id FROM pet_allergies WHERE pet_id = $1",
        )
        .bind(pet_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }

    async fn pet_health_profile(&mut self, pet_id: RecordId) -> OrderResult<PetHealthProfile> {
        if !pet_id.is_storable() {
            return Ok(PetHealthProfile::default());
        }
        let allergies = sqlx::query_as::<_, PetAllergy>(
            "SELECT id, pet_id, allergy_id, severity FROM pet_allergies WHERE pet_id = $1",
        )
        .bind(pet_id)
        .fetch_all(&mut *self.tx)
        .await?;
        let health_conditions = sqlx::query_as::<_, HealthCondition>(
            "SELECT id, pet_id, name, diagnosed_at FROM health_conditions \
             WHERE pet_id = $1 ORDER BY diagnosed_at DESC",
        )
        .bind(pet_id)
        .fetch_all(&mut *self.tx)
        .await?;
        let dietary_preferences = sqlx::query_as::<_, DietaryPreference>(
            "SELECT id, pet_id, name, description FROM dietary_preferences WHERE pet_id = $1",
        )
        .bind(pet_id)
        .fetch_all(&mut *self.tx)
        .await?;
        let allergy_description = sqlx::query_as::<_, AllergyDescription>(
            "SELECT id, pet_id, description, recorded_at FROM allergy_descriptions \
             WHERE pet_id = $1 ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(pet_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(PetHealthProfile {
            allergies,
            health_conditions,
            dietary_preferences,
            allergy_description,
        })
    }

    async fn find_prescription(
        &mut self,
        specialized_order_id: RecordId,
    ) -> OrderResult<Option<MedicalPrescription>> {
        if !specialized_order_id.is_storable() {
            return Ok(None);
        }
        let prescription = sqlx::query_as::<_, MedicalPrescription>(
            "SELECT id, pet_id, specialized_order_id, file, recorded_at \
             FROM medical_prescriptions WHERE specialized_order_id = $1",
        )
        .bind(specialized_order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(prescription)
    }

    async fn insert_specialized_order(
        &mut self,
        specialized: &SpecializedOrder,
    ) -> OrderResult<()> {
        sqlx::query(&format!(
            "INSERT INTO specialized_orders ({SPECIALIZED_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(specialized.id)
        .bind(specialized.order_id)
        .bind(specialized.pet_id)
        .bind(&specialized.feeding_frequency)
        .bind(&specialized.diet_objective)
        .bind(&specialized.additional_instructions)
        .bind(specialized.requires_nutritionist)
        .bind(&specialized.supplementary_file)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("order {}", specialized.order_id)))?;
        Ok(())
    }

    async fn insert_pet_allergy(&mut self, allergy: &PetAllergy) -> OrderResult<()> {
        sqlx::query(
            "INSERT INTO pet_allergies (id, pet_id, allergy_id, severity) VALUES ($1, $2, $3, $4)",
        )
        .bind(allergy.id)
        .bind(allergy.pet_id)
        .bind(allergy.allergy_id)
        .bind(&allergy.severity)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("pet {}", allergy.pet_id)))?;
        Ok(())
    }

    async fn insert_health_condition(&mut self, condition: &HealthCondition) -> OrderResult<()> {
        sqlx::query(
            "INSERT INTO health_conditions (id, pet_id, name, diagnosed_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(condition.id)
        .bind(condition.pet_id)
        .bind(&condition.name)
        .bind(condition.diagnosed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("pet {}", condition.pet_id)))?;
        Ok(())
    }

    async fn insert_dietary_preference(
        &mut self,
        preference: &DietaryPreference,
    ) -> OrderResult<()> {
        sqlx::query(
            "INSERT INTO dietary_preferences (id, pet_id, name, description) VALUES ($1, $2, $3, $4)",
        )
        .bind(preference.id)
        .bind(preference.pet_id)
        .bind(&preference.name)
        .bind(&preference.description)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("pet {}", preference.pet_id)))?;
        Ok(())
    }

    async fn insert_allergy_description(
        &mut self,
        description: &AllergyDescription,
    ) -> OrderResult<()> {
        sqlx::query(
            "INSERT INTO allergy_descriptions (id, pet_id, description, recorded_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(description.id)
        .bind(description.pet_id)
        .bind(&description.description)
        .bind(description.recorded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!("pet {}", description.pet_id)))?;
        Ok(())
    }

    async fn insert_medical_prescription(
        &mut self,
        prescription: &MedicalPrescription,
    ) -> OrderResult<()> {
        sqlx::query(
            "INSERT INTO medical_prescriptions (id, pet_id, specialized_order_id, file, recorded_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(prescription.id)
        .bind(prescription.pet_id)
        .bind(prescription.specialized_order_id)
        .bind(&prescription.file)
        .bind(prescription.recorded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error(format!(
            "specialized order {}",
            prescription.specialized_order_id
        )))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> OrderResult<()> {
        self.tx.commit().await.map_err(map_db_error("database"))?;
        Ok(())
    }
}
