//! Shared fixtures for the in-memory integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use pet_order_core::config::OrderCoreConfig;
use pet_order_core::database::InMemoryOrderStore;
use pet_order_core::models::{
    Address, AllergyCatalogEntry, Courier, Dish, LineItemRequest, Order, Pet, RecordId,
};
use pet_order_core::services::{
    CreateOrderRequest, DeliveryAssignmentEngine, OrderService, SpecializedOrderComposer,
    SpecializedOrderRequest,
};
use pet_order_core::state_machine::{OrderStatus, TransitionTable};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct TestHarness {
    pub store: InMemoryOrderStore,
    pub config: Arc<OrderCoreConfig>,
    pub orders: OrderService,
    pub delivery: DeliveryAssignmentEngine,
    pub composer: SpecializedOrderComposer,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(OrderCoreConfig::default())
    }

    pub fn with_config(config: OrderCoreConfig) -> Self {
        let config = Arc::new(config);
        let store = InMemoryOrderStore::new(config.transactions.lock_timeout());
        let table = Arc::new(TransitionTable::standard());
        let shared: Arc<InMemoryOrderStore> = Arc::new(store.clone());
        Self {
            orders: OrderService::new(shared.clone(), config.clone(), table.clone()),
            delivery: DeliveryAssignmentEngine::new(shared.clone(), config.clone(), table),
            composer: SpecializedOrderComposer::new(shared, config.clone()),
            store,
            config,
        }
    }

    pub async fn customer(&self) -> RecordId {
        let id = RecordId::generate();
        self.store
            .modify(|state| {
                state.customers.insert(id);
            })
            .await;
        id
    }

    pub async fn address_for(&self, customer_id: RecordId) -> RecordId {
        let address = Address {
            id: RecordId::generate(),
            customer_id,
            name: "Home".to_string(),
            reference: Some("Blue door".to_string()),
            latitude: Decimal::new(-12046374, 6),
            longitude: Decimal::new(-77042793, 6),
        };
        let id = address.id;
        self.store
            .modify(|state| {
                state.addresses.insert(address.id, address);
            })
            .await;
        id
    }

    pub async fn courier(&self, name: &str) -> RecordId {
        let courier = Courier {
            id: RecordId::generate(),
            name: name.to_string(),
            phone: "+51 999 000 111".to_string(),
        };
        let id = courier.id;
        self.store
            .modify(|state| {
                state.couriers.insert(courier.id, courier);
            })
            .await;
        id
    }

    pub async fn pet_for(&self, customer_id: RecordId) -> RecordId {
        let pet = Pet {
            id: RecordId::generate(),
            customer_id,
            name: "Luna".to_string(),
            species: Some("dog".to_string()),
        };
        let id = pet.id;
        self.store
            .modify(|state| {
                state.pets.insert(pet.id, pet);
            })
            .await;
        id
    }

    pub async fn dish(&self, cents: i64) -> RecordId {
        let dish = Dish {
            id: RecordId::generate(),
            name: "Chicken and rice".to_string(),
            unit_price: Decimal::new(cents, 2),
        };
        let id = dish.id;
        self.store
            .modify(|state| {
                state.dishes.insert(dish.id, dish);
            })
            .await;
        id
    }

    /// Dog allergy catalog entries
    pub async fn allergy_catalog(&self, ids: &[u64]) {
        for &id in ids {
            self.catalog_entry(id, Some("dog")).await;
        }
    }

    pub async fn catalog_entry(&self, id: u64, species: Option<&str>) {
        let entry = AllergyCatalogEntry {
            id: RecordId::new(id),
            name: format!("Allergen {id}"),
            species: species.map(str::to_string),
        };
        self.store
            .modify(|state| {
                state.allergy_catalog.insert(entry.id, entry);
            })
            .await;
    }

    /// A customer with one address and a placed two-dish order
    pub async fn placed_order(&self) -> Order {
        let customer_id = self.customer().await;
        let address_id = self.address_for(customer_id).await;
        let dish_id = self.dish(1250).await;
        self.orders
            .create_order(CreateOrderRequest {
                customer_id,
                address_id,
                line_items: vec![LineItemRequest {
                    dish_id,
                    quantity: 2,
                }],
                total: Decimal::new(2500, 2),
            })
            .await
            .expect("order placed")
            .order
    }

    /// Insert an order directly in the given status
    pub async fn order_in(&self, status: OrderStatus) -> Order {
        let mut order = self.placed_order().await;
        order.status = status;
        let stored = order.clone();
        self.store
            .modify(|state| {
                state.orders.insert(stored.id, stored);
            })
            .await;
        order
    }

    pub async fn stored_status(&self, order_id: RecordId) -> OrderStatus {
        self.store.snapshot().await.orders[&order_id].status
    }

    pub async fn control_count(&self, order_id: RecordId) -> usize {
        self.store
            .snapshot()
            .await
            .delivery_controls
            .iter()
            .filter(|control| control.order_id == order_id)
            .count()
    }
}

pub fn specialized_request(customer_id: RecordId, pet_id: RecordId) -> SpecializedOrderRequest {
    SpecializedOrderRequest {
        customer_id,
        pet_id,
        feeding_frequency: "Twice a day, 150g".to_string(),
        diet_objective: "Weight control".to_string(),
        additional_instructions: None,
        requires_nutritionist: false,
        allergy_ids: None,
        conditions: None,
        preferences: None,
        allergy_description: None,
        prescription_file: None,
        supplementary_file: None,
    }
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::minutes(minutes)
}
