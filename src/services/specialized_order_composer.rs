//! # Specialized Order Composer
//!
//! Builds a diet-plan order together with the pet profile records it
//! introduces, in one unit of work. Every check, including duplicate
//! detection for allergies, runs before the first write, so a failure either
//! happens before anything is written or rolls the whole unit back.

use crate::config::OrderCoreConfig;
use crate::database::OrderStore;
use crate::error::{invariant_violation, not_found, OrderError, OrderResult};
use crate::logging::{log_composition_operation, log_error};
use crate::models::{
    AllergyDescription, DietaryPreference, FileHandle, HealthCondition, MedicalPrescription,
    Order, PetAllergy, RecordId, SpecializedOrder, SpecializedOrderDetails,
    SpecializedOrderListing,
};
use crate::state_machine::OrderStatus;
use crate::utils::deadline::with_deadline;
use crate::validation::{
    optional_text, parse_allergy_ids, parse_named_entries, require_text, resolve_date,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Composition request as received from the API layer.
///
/// The structured fields carry raw JSON text: a list, or a single value that
/// is treated as a list of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializedOrderRequest {
    pub customer_id: RecordId,
    pub pet_id: RecordId,
    pub feeding_frequency: String,
    pub diet_objective: String,
    pub additional_instructions: Option<String>,
    pub requires_nutritionist: bool,
    /// Allergy catalog ids, as numbers or numeric strings
    pub allergy_ids: Option<String>,
    /// Names, or objects with `name` and an optional `date`
    pub conditions: Option<String>,
    /// Names, or objects with `name` and an optional `description`
    pub preferences: Option<String>,
    pub allergy_description: Option<String>,
    pub prescription_file: Option<FileHandle>,
    pub supplementary_file: Option<FileHandle>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub recorded: usize,
    pub skipped: usize,
}

/// What the composition actually persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionSummary {
    pub allergies: CategoryCount,
    pub health_conditions: CategoryCount,
    pub dietary_preferences: CategoryCount,
    pub allergy_description_recorded: bool,
    pub prescription_recorded: bool,
    pub supplementary_file_recorded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializedOrderCreated {
    pub order_id: RecordId,
    pub specialized_order_id: RecordId,
    pub pet_id: RecordId,
    pub status: OrderStatus,
    pub summary: CompositionSummary,
}

#[derive(Clone)]
pub struct SpecializedOrderComposer {
    store: Arc<dyn OrderStore>,
    config: Arc<OrderCoreConfig>,
}

impl SpecializedOrderComposer {
    pub fn new(store: Arc<dyn OrderStore>, config: Arc<OrderCoreConfig>) -> Self {
        Self { store, config }
    }

    #[instrument(skip(self, request), fields(
        operation_id = %Uuid::new_v4(),
        customer_id = %request.customer_id,
        pet_id = %request.pet_id,
    ))]
    pub async fn create_specialized_order(
        &self,
        request: SpecializedOrderRequest,
    ) -> OrderResult<SpecializedOrderCreated> {
        let pet_id = request.pet_id;
        let result = with_deadline(
            self.config.transactions.operation_timeout(),
            self.compose(request),
        )
        .await;

        match &result {
            Ok(created) => log_composition_operation(
                "create_specialized_order",
                Some(created.order_id),
                pet_id,
                created.status.as_str(),
                Some(&format!(
                    "allergies {}/{} skipped, conditions {}/{} skipped, preferences {}/{} skipped",
                    created.summary.allergies.recorded,
                    created.summary.allergies.skipped,
                    created.summary.health_conditions.recorded,
                    created.summary.health_conditions.skipped,
                    created.summary.dietary_preferences.recorded,
                    created.summary.dietary_preferences.skipped,
                )),
            ),
            Err(err) => log_error("create_specialized_order", err),
        }
        result
    }

    async fn compose(&self, request: SpecializedOrderRequest) -> OrderResult<SpecializedOrderCreated> {
        let composer = &self.config.composer;
        let mut uow = self.store.begin().await?;

        if !uow.customer_exists(request.customer_id).await? {
            return Err(not_found("customer", request.customer_id));
        }
        let pet = uow
            .find_pet(request.pet_id)
            .await?
            .ok_or_else(|| not_found("pet", request.pet_id))?;
        if pet.customer_id != request.customer_id {
            return Err(OrderError::Authorization {
                entity: "pet",
                id: pet.id.to_string(),
                customer_id: request.customer_id.to_string(),
            });
        }

        let feeding_frequency = require_text("feeding_frequency", &request.feeding_frequency)?;
        let diet_objective = require_text("diet_objective", &request.diet_objective)?;
        let additional_instructions = optional_text(
            "additional_instructions",
            request.additional_instructions.as_deref(),
        )?;
        let allergy_text =
            optional_text("allergy_description", request.allergy_description.as_deref())?;

        let allergy_ids =
            parse_allergy_ids(request.allergy_ids.as_deref(), composer.max_items_per_category)?;
        let conditions = parse_named_entries(
            "conditions",
            request.conditions.as_deref(),
            "date",
            composer.max_items_per_category,
        )?;
        let preferences = parse_named_entries(
            "preferences",
            request.preferences.as_deref(),
            "description",
            composer.max_items_per_category,
        )?;

        for allergy_id in &allergy_ids {
            let entry = uow
                .find_allergy(*allergy_id)
                .await?
                .ok_or_else(|| not_found("allergy", allergy_id))?;
            if let Some(species) = pet.species.as_deref() {
                if !entry.applies_to(Some(species)) {
                    return Err(not_found(
                        "allergy",
                        format!("{allergy_id} for species {species}"),
                    ));
                }
            }
        }

        let mut summary = CompositionSummary::default();
        let mut seen: HashSet<RecordId> = uow.pet_allergy_ids(pet.id).await?.into_iter().collect();
        let mut new_allergy_ids = Vec::new();
        for allergy_id in allergy_ids {
            if seen.insert(allergy_id) {
                new_allergy_ids.push(allergy_id);
            } else {
                summary.allergies.skipped += 1;
            }
        }

        let now = Utc::now();
        let order = Order::new_specialized(request.customer_id, now);
        let specialized = SpecializedOrder {
            id: RecordId::generate(),
            order_id: order.id,
            pet_id: pet.id,
            feeding_frequency,
            diet_objective,
            additional_instructions,
            requires_nutritionist: request.requires_nutritionist,
            supplementary_file: request.supplementary_file,
        };

        uow.insert_order(&order).await?;
        uow.insert_specialized_order(&specialized).await?;
        summary.supplementary_file_recorded = specialized.supplementary_file.is_some();

        for allergy_id in new_allergy_ids {
            uow.insert_pet_allergy(&PetAllergy {
                id: RecordId::generate(),
                pet_id: pet.id,
                allergy_id,
                severity: composer.default_allergy_severity.clone(),
            })
            .await?;
            summary.allergies.recorded += 1;
        }

        for entry in conditions {
            if entry.name.is_empty() {
                summary.health_conditions.skipped += 1;
                continue;
            }
            uow.insert_health_condition(&HealthCondition {
                id: RecordId::generate(),
                pet_id: pet.id,
                diagnosed_at: resolve_date(entry.detail.as_deref(), now),
                name: entry.name,
            })
            .await?;
            summary.health_conditions.recorded += 1;
        }

        for entry in preferences {
            if entry.name.is_empty() {
                summary.dietary_preferences.skipped += 1;
                continue;
            }
            uow.insert_dietary_preference(&DietaryPreference {
                id: RecordId::generate(),
                pet_id: pet.id,
                name: entry.name,
                description: entry.detail,
            })
            .await?;
            summary.dietary_preferences.recorded += 1;
        }

        if let Some(description) = allergy_text {
            uow.insert_allergy_description(&AllergyDescription {
                id: RecordId::generate(),
                pet_id: pet.id,
                description,
                recorded_at: now,
            })
            .await?;
            summary.allergy_description_recorded = true;
        }

        if let Some(file) = request.prescription_file {
            uow.insert_medical_prescription(&MedicalPrescription {
                id: RecordId::generate(),
                pet_id: pet.id,
                specialized_order_id: specialized.id,
                file,
                recorded_at: now,
            })
            .await?;
            summary.prescription_recorded = true;
        }

        uow.commit().await?;

        Ok(SpecializedOrderCreated {
            order_id: order.id,
            specialized_order_id: specialized.id,
            pet_id: pet.id,
            status: order.status,
            summary,
        })
    }

    /// A specialized order with its parent order and the pet's profile
    pub async fn get_specialized_order(&self, order_id: RecordId) -> OrderResult<SpecializedOrderDetails> {
        with_deadline(self.config.transactions.operation_timeout(), async {
            let mut uow = self.store.begin().await?;
            let order = uow
                .find_order(order_id)
                .await?
                .ok_or_else(|| not_found("order", order_id))?;
            let specialized = uow
                .find_specialized_order(order_id)
                .await?
                .ok_or_else(|| not_found("specialized order", order_id))?;
            let pet = uow.find_pet(specialized.pet_id).await?.ok_or_else(|| {
                invariant_violation(format!(
                    "specialized order {} references missing pet {}",
                    specialized.id, specialized.pet_id
                ))
            })?;
            let profile = uow.pet_health_profile(pet.id).await?;
            let prescription = uow.find_prescription(specialized.id).await?;

            Ok(SpecializedOrderDetails {
                order,
                specialized,
                pet,
                profile,
                prescription,
            })
        })
        .await
    }

    /// The customer's specialized orders, newest first
    pub async fn list_specialized_orders(
        &self,
        customer_id: RecordId,
    ) -> OrderResult<Vec<SpecializedOrderListing>> {
        with_deadline(self.config.transactions.operation_timeout(), async {
            let mut uow = self.store.begin().await?;
            if !uow.customer_exists(customer_id).await? {
                return Err(not_found("customer", customer_id));
            }
            let mut listings = Vec::new();
            for (order, specialized) in uow.list_specialized_orders(customer_id).await? {
                let pet = uow.find_pet(specialized.pet_id).await?;
                listings.push(SpecializedOrderListing {
                    order,
                    specialized,
                    pet,
                });
            }
            Ok(listings)
        })
        .await
    }
}
