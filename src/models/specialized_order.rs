//! # Specialized Order Model
//!
//! A diet-plan extension of an order, built around one pet's health profile.
//! The pet profile records (allergies, health conditions, dietary preferences,
//! free-text allergy descriptions, prescriptions) are keyed to the pet so they
//! outlive the order that introduced them.

use super::identifiers::RecordId;
use super::order::Order;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Opaque path or handle returned by the file storage collaborator.
///
/// The contents behind the handle are never read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct FileHandle(String);

impl FileHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SpecializedOrder {
    pub id: RecordId,
    pub order_id: RecordId,
    pub pet_id: RecordId,
    pub feeding_frequency: String,
    pub diet_objective: String,
    pub additional_instructions: Option<String>,
    pub requires_nutritionist: bool,
    pub supplementary_file: Option<FileHandle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Pet {
    pub id: RecordId,
    pub customer_id: RecordId,
    pub name: String,
    pub species: Option<String>,
}

/// Allergy catalog entry. An entry without a species applies to every pet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AllergyCatalogEntry {
    pub id: RecordId,
    pub name: String,
    pub species: Option<String>,
}

impl AllergyCatalogEntry {
    /// Whether the entry may be recorded for a pet of `species`
    pub fn applies_to(&self, species: Option<&str>) -> bool {
        match (self.species.as_deref(), species) {
            (Some(entry), Some(pet)) => entry.eq_ignore_ascii_case(pet.trim()),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PetAllergy {
    pub id: RecordId,
    pub pet_id: RecordId,
    /// Entry in the species allergy catalog
    pub allergy_id: RecordId,
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HealthCondition {
    pub id: RecordId,
    pub pet_id: RecordId,
    pub name: String,
    pub diagnosed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DietaryPreference {
    pub id: RecordId,
    pub pet_id: RecordId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AllergyDescription {
    pub id: RecordId,
    pub pet_id: RecordId,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MedicalPrescription {
    pub id: RecordId,
    pub pet_id: RecordId,
    pub specialized_order_id: RecordId,
    pub file: FileHandle,
    pub recorded_at: DateTime<Utc>,
}

/// Everything recorded about a pet that a nutritionist reviews
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetHealthProfile {
    pub allergies: Vec<PetAllergy>,
    pub health_conditions: Vec<HealthCondition>,
    pub dietary_preferences: Vec<DietaryPreference>,
    /// Most recent free-text description
    pub allergy_description: Option<AllergyDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializedOrderDetails {
    pub order: Order,
    pub specialized: SpecializedOrder,
    pub pet: Pet,
    pub profile: PetHealthProfile,
    pub prescription: Option<MedicalPrescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializedOrderListing {
    pub order: Order,
    pub specialized: SpecializedOrder,
    pub pet: Option<Pet>,
}
