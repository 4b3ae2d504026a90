//! Specialized order composition

mod common;

use common::{specialized_request, TestHarness};
use pet_order_core::config::OrderCoreConfig;
use pet_order_core::database::WriteTarget;
use pet_order_core::error::{ErrorKind, OrderError};
use pet_order_core::models::{FileHandle, RecordId};
use pet_order_core::state_machine::OrderStatus;
use rust_decimal::Decimal;

async fn owner_and_pet(harness: &TestHarness) -> (RecordId, RecordId) {
    let customer_id = harness.customer().await;
    let pet_id = harness.pet_for(customer_id).await;
    harness.allergy_catalog(&[1, 2, 3, 4]).await;
    (customer_id, pet_id)
}

async fn assert_nothing_persisted(harness: &TestHarness, pet_id: RecordId) {
    let state = harness.store.snapshot().await;
    assert!(state.orders.is_empty());
    assert!(state.specialized_orders.is_empty());
    assert!(state.pet_allergies.iter().all(|a| a.pet_id != pet_id));
    assert!(state.health_conditions.iter().all(|c| c.pet_id != pet_id));
    assert!(state.dietary_preferences.iter().all(|p| p.pet_id != pet_id));
    assert!(state.allergy_descriptions.iter().all(|d| d.pet_id != pet_id));
    assert!(state.medical_prescriptions.iter().all(|p| p.pet_id != pet_id));
}

#[tokio::test]
async fn test_composition_with_every_sub_record() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.additional_instructions = Some("Soft food only".to_string());
    request.requires_nutritionist = true;
    request.allergy_ids = Some("[1, \"2\"]".to_string());
    request.conditions = Some(
        r#"[{"name": "Dermatitis", "date": "2024-03-10"}, "Otitis", {"name": "  "}]"#.to_string(),
    );
    request.preferences = Some(r#"{"name": "Fish", "description": "Prefers salmon"}"#.to_string());
    request.allergy_description = Some("Itches after eating chicken".to_string());
    request.prescription_file = Some(FileHandle::new("prescriptions/luna-2024.pdf"));
    request.supplementary_file = Some(FileHandle::new("plans/luna-notes.pdf"));

    let created = harness.composer.create_specialized_order(request).await.unwrap();
    assert_eq!(created.status, OrderStatus::Pending);
    assert_eq!(created.summary.allergies.recorded, 2);
    assert_eq!(created.summary.allergies.skipped, 0);
    assert_eq!(created.summary.health_conditions.recorded, 2);
    assert_eq!(created.summary.health_conditions.skipped, 1);
    assert_eq!(created.summary.dietary_preferences.recorded, 1);
    assert!(created.summary.allergy_description_recorded);
    assert!(created.summary.prescription_recorded);
    assert!(created.summary.supplementary_file_recorded);

    let details = harness
        .composer
        .get_specialized_order(created.order_id)
        .await
        .unwrap();
    assert_eq!(details.order.total, Decimal::ZERO);
    assert!(details.order.address_id.is_none());
    assert!(!details.order.includes_dishes);
    assert_eq!(details.specialized.id, created.specialized_order_id);
    assert!(details.specialized.requires_nutritionist);
    assert_eq!(details.pet.id, pet_id);
    assert_eq!(details.profile.allergies.len(), 2);
    assert!(details
        .profile
        .allergies
        .iter()
        .all(|allergy| allergy.severity == "moderate"));
    assert_eq!(details.profile.health_conditions.len(), 2);
    assert_eq!(
        details.profile.dietary_preferences[0].description.as_deref(),
        Some("Prefers salmon")
    );
    assert!(details.profile.allergy_description.is_some());
    assert_eq!(
        details.prescription.map(|p| p.file),
        Some(FileHandle::new("prescriptions/luna-2024.pdf"))
    );

    let dermatitis = details
        .profile
        .health_conditions
        .iter()
        .find(|c| c.name == "Dermatitis")
        .unwrap();
    assert_eq!(dermatitis.diagnosed_at.date_naive().to_string(), "2024-03-10");

    let aggregate = harness.orders.get_order(created.order_id).await.unwrap();
    assert!(aggregate.line_items.is_empty());
    assert!(aggregate.specialized.is_some());
}

#[tokio::test]
async fn test_identical_allergies_persist_once() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.allergy_ids = Some("[3, 3]".to_string());

    let created = harness.composer.create_specialized_order(request).await.unwrap();
    assert_eq!(created.summary.allergies.recorded, 1);
    assert_eq!(created.summary.allergies.skipped, 1);

    let state = harness.store.snapshot().await;
    assert_eq!(
        state
            .pet_allergies
            .iter()
            .filter(|a| a.pet_id == pet_id && a.allergy_id == RecordId::new(3))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_allergies_already_on_record_are_skipped() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let mut first = specialized_request(customer_id, pet_id);
    first.allergy_ids = Some("[1, 2]".to_string());
    harness.composer.create_specialized_order(first).await.unwrap();

    let mut second = specialized_request(customer_id, pet_id);
    second.allergy_ids = Some("[2, 4]".to_string());
    let created = harness.composer.create_specialized_order(second).await.unwrap();
    assert_eq!(created.summary.allergies.recorded, 1);
    assert_eq!(created.summary.allergies.skipped, 1);

    let state = harness.store.snapshot().await;
    assert_eq!(state.pet_allergies.len(), 3);
}

#[tokio::test]
async fn test_malformed_conditions_rolls_back_everything() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.allergy_ids = Some("[1]".to_string());
    request.conditions = Some("[{\"name\": \"Otitis\"".to_string());
    request.allergy_description = Some("Sneezes".to_string());

    let err = harness.composer.create_specialized_order(request).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "conditions"));
    assert!(err.to_string().contains("conditions"));
    assert_nothing_persisted(&harness, pet_id).await;
}

#[tokio::test]
async fn test_malformed_structured_fields_name_the_field() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let cases = [
        ("allergy_ids", "[\"peanuts\"]"),
        ("preferences", "{broken"),
        ("conditions", "[42]"),
    ];
    for (field, raw) in cases {
        let mut request = specialized_request(customer_id, pet_id);
        match field {
            "allergy_ids" => request.allergy_ids = Some(raw.to_string()),
            "preferences" => request.preferences = Some(raw.to_string()),
            _ => request.conditions = Some(raw.to_string()),
        }
        let err = harness.composer.create_specialized_order(request).await.unwrap_err();
        assert!(
            matches!(err, OrderError::Validation { field: ref f, .. } if f == field),
            "{field}: {err}"
        );
    }
    assert_nothing_persisted(&harness, pet_id).await;
}

#[tokio::test]
async fn test_mandatory_diet_fields() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.feeding_frequency = "   ".to_string();
    let err = harness.composer.create_specialized_order(request).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "feeding_frequency"));

    let mut request = specialized_request(customer_id, pet_id);
    request.diet_objective = String::new();
    let err = harness.composer.create_specialized_order(request).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "diet_objective"));

    assert_nothing_persisted(&harness, pet_id).await;
}

#[tokio::test]
async fn test_pet_must_exist_and_belong_to_customer() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;
    let stranger = harness.customer().await;

    let err = harness
        .composer
        .create_specialized_order(specialized_request(stranger, pet_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(err.kind().status_code(), 403);

    let err = harness
        .composer
        .create_specialized_order(specialized_request(customer_id, RecordId::new(31337)))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotFound { entity: "pet", .. }));
}

#[tokio::test]
async fn test_unknown_allergy_is_rejected_before_writes() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.allergy_ids = Some("[1, 99]".to_string());
    let err = harness.composer.create_specialized_order(request).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound { entity: "allergy", ref id } if id == "99"));
    assert_nothing_persisted(&harness, pet_id).await;
}

#[tokio::test]
async fn test_allergy_from_another_species_is_rejected() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;
    harness.catalog_entry(50, Some("cat")).await;
    harness.catalog_entry(51, None).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.allergy_ids = Some("[1, 50]".to_string());
    let err = harness.composer.create_specialized_order(request).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound { entity: "allergy", ref id } if id.starts_with("50")));
    assert_nothing_persisted(&harness, pet_id).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.allergy_ids = Some("[1, 51]".to_string());
    let created = harness.composer.create_specialized_order(request).await.unwrap();
    assert_eq!(created.summary.allergies.recorded, 2);
}

#[tokio::test]
async fn test_category_cap_from_configuration() {
    let mut config = OrderCoreConfig::default();
    config.composer.max_items_per_category = 2;
    let harness = TestHarness::with_config(config);
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let mut request = specialized_request(customer_id, pet_id);
    request.preferences = Some("[\"Fish\", \"Lamb\", \"Duck\"]".to_string());
    let err = harness.composer.create_specialized_order(request).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "preferences"));
}

#[tokio::test]
async fn test_write_failure_mid_composition_rolls_back() {
    for target in [
        WriteTarget::SpecializedOrder,
        WriteTarget::PetAllergy,
        WriteTarget::HealthCondition,
        WriteTarget::DietaryPreference,
        WriteTarget::AllergyDescription,
        WriteTarget::MedicalPrescription,
    ] {
        let harness = TestHarness::new();
        let (customer_id, pet_id) = owner_and_pet(&harness).await;

        let mut request = specialized_request(customer_id, pet_id);
        request.allergy_ids = Some("[1, 2]".to_string());
        request.conditions = Some("[\"Otitis\"]".to_string());
        request.preferences = Some("[\"Fish\"]".to_string());
        request.allergy_description = Some("Sneezes".to_string());
        request.prescription_file = Some(FileHandle::new("rx.pdf"));

        harness.store.fail_writes_to(Some(target)).await;
        let err = harness.composer.create_specialized_order(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage, "{target:?}");

        harness.store.fail_writes_to(None).await;
        assert_nothing_persisted(&harness, pet_id).await;
    }
}

#[tokio::test]
async fn test_list_specialized_orders_newest_first() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;

    let first = harness
        .composer
        .create_specialized_order(specialized_request(customer_id, pet_id))
        .await
        .unwrap();
    let second = harness
        .composer
        .create_specialized_order(specialized_request(customer_id, pet_id))
        .await
        .unwrap();
    harness
        .store
        .modify(|state| {
            if let Some(order) = state.orders.get_mut(&first.order_id) {
                order.created_at = common::minutes_ago(30);
            }
        })
        .await;

    let listings = harness.composer.list_specialized_orders(customer_id).await.unwrap();
    let ids: Vec<RecordId> = listings.iter().map(|l| l.order.id).collect();
    assert_eq!(ids, vec![second.order_id, first.order_id]);
    assert!(listings.iter().all(|l| l.pet.as_ref().map(|p| p.id) == Some(pet_id)));

    let someone_else = harness.customer().await;
    assert!(harness
        .composer
        .list_specialized_orders(someone_else)
        .await
        .unwrap()
        .is_empty());

    let err = harness
        .composer
        .get_specialized_order(RecordId::new(8))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_specialized_order_follows_lifecycle() {
    let harness = TestHarness::new();
    let (customer_id, pet_id) = owner_and_pet(&harness).await;
    let created = harness
        .composer
        .create_specialized_order(specialized_request(customer_id, pet_id))
        .await
        .unwrap();

    let courier = harness.courier("Rosa").await;
    let outcome = harness.delivery.assign(created.order_id, courier).await.unwrap();
    assert_eq!(outcome.status, OrderStatus::Assigned);
}
