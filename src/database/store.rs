//! # Store Traits
//!
//! The persistence seam between the services and a backing store. A service
//! operation opens exactly one [`UnitOfWork`], performs its reads and writes
//! through it and commits. Dropping a unit of work without committing rolls
//! every write back.
//!
//! Mutating operations take the per-order write lock with
//! [`UnitOfWork::lock_order`] before reading the order's status, so at most
//! one writer per order is ever in flight. A writer that cannot obtain the
//! lock in time fails with a conflict instead of overwriting.

use crate::error::OrderResult;
use crate::models::{
    Address, AllergyCatalogEntry, AllergyDescription, Courier, DeliveryControl, DietaryPreference, Dish,
    HealthCondition, MedicalPrescription, Order, OrderFilter, OrderLineItem, Payment, Pet,
    PetAllergy, PetHealthProfile, RecordId, SpecializedOrder,
};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> OrderResult<Box<dyn UnitOfWork>>;

    /// Cheap liveness probe
    async fn health_check(&self) -> OrderResult<()>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    // Reference data owned by external collaborators

    async fn customer_exists(&mut self, customer_id: RecordId) -> OrderResult<bool>;
    async fn find_address(&mut self, address_id: RecordId) -> OrderResult<Option<Address>>;
    async fn find_courier(&mut self, courier_id: RecordId) -> OrderResult<Option<Courier>>;
    async fn find_pet(&mut self, pet_id: RecordId) -> OrderResult<Option<Pet>>;
    async fn find_dish(&mut self, dish_id: RecordId) -> OrderResult<Option<Dish>>;
    async fn find_allergy(
        &mut self,
        allergy_id: RecordId,
    ) -> OrderResult<Option<AllergyCatalogEntry>>;

    // Orders

    async fn find_order(&mut self, order_id: RecordId) -> OrderResult<Option<Order>>;

    /// Load the order holding its write lock until the unit of work ends
    async fn lock_order(&mut self, order_id: RecordId) -> OrderResult<Option<Order>>;

    /// Orders matching the filter, newest first
    async fn list_orders(&mut self, filter: &OrderFilter) -> OrderResult<Vec<Order>>;
    async fn line_items(&mut self, order_id: RecordId) -> OrderResult<Vec<OrderLineItem>>;
    async fn find_payment(&mut self, order_id: RecordId) -> OrderResult<Option<Payment>>;
    async fn insert_order(&mut self, order: &Order) -> OrderResult<()>;
    async fn insert_line_item(&mut self, item: &OrderLineItem) -> OrderResult<()>;

    /// Only the order state machine calls this
    async fn update_order_status(&mut self, order_id: RecordId, status: OrderStatus)
        -> OrderResult<()>;

    // Delivery control

    async fn find_delivery_control(&mut self, order_id: RecordId)
        -> OrderResult<Option<DeliveryControl>>;

    /// Every control record, or only those held by one courier
    async fn list_delivery_controls(
        &mut self,
        courier_id: Option<RecordId>,
    ) -> OrderResult<Vec<DeliveryControl>>;
    async fn insert_delivery_control(&mut self, control: &DeliveryControl) -> OrderResult<()>;
    async fn update_delivery_control(&mut self, control: &DeliveryControl) -> OrderResult<()>;

    // Specialized orders and pet profile

    async fn find_specialized_order(&mut self, order_id: RecordId)
        -> OrderResult<Option<SpecializedOrder>>;

    /// The customer's specialized orders with their parent orders, newest first
    async fn list_specialized_orders(
        &mut self,
        customer_id: RecordId,
    ) -> OrderResult<Vec<(Order, SpecializedOrder)>>;

    /// Catalog entries already recorded as allergies of the pet
    async fn pet_allergy_ids(&mut self, pet_id: RecordId) -> OrderResult<Vec<RecordId>>;
    async fn pet_health_profile(&mut self, pet_id: RecordId) -> OrderResult<PetHealthProfile>;
    async fn find_prescription(
        &mut self,
        specialized_order_id: RecordId,
    ) -> OrderResult<Option<MedicalPrescription>>;
    async fn insert_specialized_order(&mut self, specialized: &SpecializedOrder)
        -> OrderResult<()>;
    async fn insert_pet_allergy(&mut self, allergy: &PetAllergy) -> OrderResult<()>;
    async fn insert_health_condition(&mut self, condition: &HealthCondition) -> OrderResult<()>;
    async fn insert_dietary_preference(&mut self, preference: &DietaryPreference)
        -> OrderResult<()>;
    async fn insert_allergy_description(&mut self, description: &AllergyDescription)
        -> OrderResult<()>;
    async fn insert_medical_prescription(&mut self, prescription: &MedicalPrescription)
        -> OrderResult<()>;

    /// Make every write of this unit visible atomically
    async fn commit(self: Box<Self>) -> OrderResult<()>;
}
