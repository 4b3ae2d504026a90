//! # In-Memory Store
//!
//! A single-writer store for tests and embedded use. A unit of work owns the
//! store mutex for its whole lifetime and writes to a private working copy;
//! `commit` swaps the copy in, dropping the unit discards it. Waiting for the
//! mutex is bounded by the lock timeout and expiry is reported as a conflict,
//! matching the PostgreSQL store's `lock_timeout` behavior.
//!
//! Write failures can be injected per record kind to exercise rollback.

use super::store::{OrderStore, UnitOfWork};
use crate::error::{conflict, OrderError, OrderResult};
use crate::models::{
    Address, AllergyCatalogEntry, AllergyDescription, Courier, DeliveryControl, DietaryPreference, Dish,
    HealthCondition, MedicalPrescription, Order, OrderFilter, OrderLineItem, Payment, Pet,
    PetAllergy, PetHealthProfile, RecordId, SpecializedOrder,
};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Record kinds a write failure can be injected for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Order,
    LineItem,
    OrderStatus,
    DeliveryControl,
    SpecializedOrder,
    PetAllergy,
    HealthCondition,
    DietaryPreference,
    AllergyDescription,
    MedicalPrescription,
}

/// Committed contents of the store
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub customers: HashSet<RecordId>,
    pub addresses: HashMap<RecordId, Address>,
    pub couriers: HashMap<RecordId, Courier>,
    pub pets: HashMap<RecordId, Pet>,
    pub dishes: HashMap<RecordId, Dish>,
    pub allergy_catalog: HashMap<RecordId, AllergyCatalogEntry>,
    pub orders: HashMap<RecordId, Order>,
    pub line_items: Vec<OrderLineItem>,
    /// Keyed by order
    pub payments: HashMap<RecordId, Payment>,
    pub delivery_controls: Vec<DeliveryControl>,
    pub specialized_orders: Vec<SpecializedOrder>,
    pub pet_allergies: Vec<PetAllergy>,
    pub health_conditions: Vec<HealthCondition>,
    pub dietary_preferences: Vec<DietaryPreference>,
    pub allergy_descriptions: Vec<AllergyDescription>,
    pub medical_prescriptions: Vec<MedicalPrescription>,
    fail_on: Option<WriteTarget>,
}

#[derive(Debug, Clone)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

impl InMemoryOrderStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout,
        }
    }

    /// Mutate committed state directly, outside any unit of work
    pub async fn modify<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make every later write to `target` fail until cleared
    pub async fn fail_writes_to(&self, target: Option<WriteTarget>) {
        self.state.lock().await.fail_on = target;
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> OrderResult<Box<dyn UnitOfWork>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                conflict(
                    "order store",
                    format!("write lock not acquired within {:?}", self.lock_timeout),
                )
            })?;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
        }))
    }

    async fn health_check(&self) -> OrderResult<()> {
        Ok(())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryUnitOfWork {
    fn check_injected(&self, target: WriteTarget) -> OrderResult<()> {
        if self.working.fail_on == Some(target) {
            return Err(OrderError::Storage(sqlx::Error::Protocol(format!(
                "injected write failure for {target:?}"
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn customer_exists(&mut self, customer_id: RecordId) -> OrderResult<bool> {
        Ok(self.working.customers.contains(&customer_id))
    }

    async fn find_address(&mut self, address_id: RecordId) -> OrderResult<Option<Address>> {
        Ok(self.working.addresses.get(&address_id).cloned())
    }

    async fn find_courier(&mut self, courier_id: RecordId) -> OrderResult<Option<Courier>> {
        Ok(self.working.couriers.get(&courier_id).cloned())
    }

    async fn find_pet(&mut self, pet_id: RecordId) -> OrderResult<Option<Pet>> {
        Ok(self.working.pets.get(&pet_id).cloned())
    }

    async fn find_dish(&mut self, dish_id: RecordId) -> OrderResult<Option<Dish>> {
        Ok(self.working.dishes.get(&dish_id).cloned())
    }

    async fn find_allergy(
        &mut self,
        allergy_id: RecordId,
    ) -> OrderResult<Option<AllergyCatalogEntry>> {
        Ok(self.working.allergy_catalog.get(&allergy_id).cloned())
    }

    async fn find_order(&mut self, order_id: RecordId) -> OrderResult<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn lock_order(&mut self, order_id: RecordId) -> OrderResult<Option<Order>> {
        // The unit of work already holds the store-wide lock
        self.find_order(order_id).await
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> OrderResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn line_items(&mut self, order_id: RecordId) -> OrderResult<Vec<OrderLineItem>> {
        Ok(self
            .working
            .line_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_payment(&mut self, order_id: RecordId) -> OrderResult<Option<Payment>> {
        Ok(self.working.payments.get(&order_id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> OrderResult<()> {
        self.check_injected(WriteTarget::Order)?;
        if self.working.orders.contains_key(&order.id) {
            return Err(conflict(format!("order {}", order.id), "duplicate key"));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_line_item(&mut self, item: &OrderLineItem) -> OrderResult<()> {
        self.check_injected(WriteTarget::LineItem)?;
        self.working.line_items.push(item.clone());
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: RecordId,
        status: OrderStatus,
    ) -> OrderResult<()> {
        self.check_injected(WriteTarget::OrderStatus)?;
        match self.working.orders.get_mut(&order_id) {
            Some(order) => {
                order.status = status;
                Ok(())
            }
            None => Err(crate::error::not_found("order", order_id)),
        }
    }

    async fn find_delivery_control(
        &mut self,
        order_id: RecordId,
    ) -> OrderResult<Option<DeliveryControl>> {
        Ok(self
            .working
            .delivery_controls
            .iter()
            .find(|control| control.order_id == order_id)
            .cloned())
    }

    async fn list_delivery_controls(
        &mut self,
        courier_id: Option<RecordId>,
    ) -> OrderResult<Vec<DeliveryControl>> {
        Ok(self
            .working
            .delivery_controls
            .iter()
            .filter(|control| courier_id.map_or(true, |id| control.courier_id == Some(id)))
            .cloned()
            .collect())
    }

    async fn insert_delivery_control(&mut self, control: &DeliveryControl) -> OrderResult<()> {
        self.check_injected(WriteTarget::DeliveryControl)?;
        if self
            .working
            .delivery_controls
            .iter()
            .any(|existing| existing.order_id == control.order_id)
        {
            return Err(conflict(
                format!("order {}", control.order_id),
                "delivery control already exists",
            ));
        }
        self.working.delivery_controls.push(control.clone());
        Ok(())
    }

    async fn update_delivery_control(&mut self, control: &DeliveryControl) -> OrderResult<()> {
        self.check_injected(WriteTarget::DeliveryControl)?;
        match self
            .working
            .delivery_controls
            .iter_mut()
            .find(|existing| existing.id == control.id)
        {
            Some(existing) => {
                *existing = control.clone();
                Ok(())
            }
            None => Err(crate::error::not_found("delivery control", control.id)),
        }
    }

    async fn find_specialized_order(
        &mut self,
        order_id: RecordId,
    ) -> OrderResult<Option<SpecializedOrder>> {
        Ok(self
            .working
            .specialized_orders
            .iter()
            .find(|specialized| specialized.order_id == order_id)
            .cloned())
    }

    async fn list_specialized_orders(
        &mut self,
        customer_id: RecordId,
    ) -> OrderResult<Vec<(Order, SpecializedOrder)>> {
        let mut listed: Vec<(Order, SpecializedOrder)> = self
            .working
            .specialized_orders
            .iter()
            .filter_map(|specialized| {
                self.working
                    .orders
                    .get(&specialized.order_id)
                    .filter(|order| order.customer_id == customer_id)
                    .map(|order| (order.clone(), specialized.clone()))
            })
            .collect();
        listed.sort_by(|(a, _), (b, _)| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(listed)
    }

    async fn pet_allergy_ids(&mut self, pet_id: RecordId) -> OrderResult<Vec<RecordId>> {
        Ok(self
            .working
            .pet_allergies
            .iter()
            .filter(|allergy| allergy.pet_id == pet_id)
            .map(|allergy| allergy.allergy_id)
            .collect())
    }

    async fn pet_health_profile(&mut self, pet_id: RecordId) -> OrderResult<PetHealthProfile> {
        let state = &self.working;
        Ok(PetHealthProfile {
            allergies: state
                .pet_allergies
                .iter()
                .filter(|a| a.pet_id == pet_id)
                .cloned()
                .collect(),
            health_conditions: state
                .health_conditions
                .iter()
                .filter(|c| c.pet_id == pet_id)
                .cloned()
                .collect(),
            dietary_preferences: state
                .dietary_preferences
                .iter()
                .filter(|p| p.pet_id == pet_id)
                .cloned()
                .collect(),
            allergy_description: state
                .allergy_descriptions
                .iter()
                .filter(|d| d.pet_id == pet_id)
                .max_by_key(|d| d.recorded_at)
                .cloned(),
        })
    }

    async fn find_prescription(
        &mut self,
        specialized_order_id: RecordId,
    ) -> OrderResult<Option<MedicalPrescription>> {
        Ok(self
            .working
            .medical_prescriptions
            .iter()
            .find(|p| p.specialized_order_id == specialized_order_id)
            .cloned())
    }

    async fn insert_specialized_order(
        &mut self,
        specialized: &SpecializedOrder,
    ) -> OrderResult<()> {
        self.check_injected(WriteTarget::SpecializedOrder)?;
        if self
            .working
            .specialized_orders
            .iter()
            .any(|existing| existing.order_id == specialized.order_id)
        {
            return Err(conflict(
                format!("order {}", specialized.order_id),
                "specialized order already exists",
            ));
        }
        self.working.specialized_orders.push(specialized.clone());
        Ok(())
    }

    async fn insert_pet_allergy(&mut self, allergy: &PetAllergy) -> OrderResult<()> {
        self.check_injected(WriteTarget::PetAllergy)?;
        if self
            .working
            .pet_allergies
            .iter()
            .any(|a| a.pet_id == allergy.pet_id && a.allergy_id == allergy.allergy_id)
        {
            return Err(conflict(
                format!("pet {}", allergy.pet_id),
                format!("allergy {} already recorded", allergy.allergy_id),
            ));
        }
        self.working.pet_allergies.push(allergy.clone());
        Ok(())
    }

    async fn insert_health_condition(&mut self, condition: &HealthCondition) -> OrderResult<()> {
        self.check_injected(WriteTarget::HealthCondition)?;
        self.working.health_conditions.push(condition.clone());
        Ok(())
    }

    async fn insert_dietary_preference(
        &mut self,
        preference: &DietaryPreference,
    ) -> OrderResult<()> {
        self.check_injected(WriteTarget::DietaryPreference)?;
        self.working.dietary_preferences.push(preference.clone());
        Ok(())
    }

    async fn insert_allergy_description(
        &mut self,
        description: &AllergyDescription,
    ) -> OrderResult<()> {
        self.check_injected(WriteTarget::AllergyDescription)?;
        self.working.allergy_descriptions.push(description.clone());
        Ok(())
    }

    async fn insert_medical_prescription(
        &mut self,
        prescription: &MedicalPrescription,
    ) -> OrderResult<()> {
        self.check_injected(WriteTarget::MedicalPrescription)?;
        if self
            .working
            .medical_prescriptions
            .iter()
            .any(|p| p.specialized_order_id == prescription.specialized_order_id)
        {
            return Err(conflict(
                format!("specialized order {}", prescription.specialized_order_id),
                "prescription already attached",
            ));
        }
        self.working.medical_prescriptions.push(prescription.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> OrderResult<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
