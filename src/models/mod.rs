//! # Data Models
//!
//! Plain records shared by the state machine, the stores and the services.
//! Row-mapped types derive `sqlx::FromRow`; `Order` is decoded through a row
//! type in the PostgreSQL store so an unknown stored status is reported as an
//! invariant violation instead of a decode failure.

pub mod delivery_control;
pub mod identifiers;
pub mod order;
pub mod specialized_order;

pub use delivery_control::{Courier, DeliveryAssignment, DeliveryControl, DeliveryOutcome};
pub use identifiers::RecordId;
pub use order::{
    Address, Dish, LineItemRequest, Order, OrderDetails, OrderFilter, OrderLineItem, Payment,
    MAX_MONEY, MONEY_SCALE,
};
pub use specialized_order::{
    AllergyCatalogEntry, AllergyDescription, DietaryPreference, FileHandle, HealthCondition, MedicalPrescription, Pet,
    PetAllergy, PetHealthProfile, SpecializedOrder, SpecializedOrderDetails,
    SpecializedOrderListing,
};
