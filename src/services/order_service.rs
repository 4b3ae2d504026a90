//! # Order Aggregate
//!
//! Placement and retrieval of orders. An order and its line items are written
//! in one unit of work; every check runs before the first write.
//!
//! ```rust
//! use pet_order_core::config::OrderCoreConfig;
//! use pet_order_core::database::InMemoryOrderStore;
//! use pet_order_core::models::{Address, Dish, LineItemRequest, RecordId};
//! use pet_order_core::services::{CreateOrderRequest, OrderService};
//! use pet_order_core::state_machine::{OrderStatus, TransitionTable};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = Arc::new(OrderCoreConfig::default());
//! let store = Arc::new(InMemoryOrderStore::new(config.transactions.lock_timeout()));
//! store
//!     .modify(|state| {
//!         state.customers.insert(RecordId::new(1));
//!         state.addresses.insert(
//!             RecordId::new(2),
//!             Address {
//!                 id: RecordId::new(2),
//!                 customer_id: RecordId::new(1),
//!                 name: "Home".to_string(),
//!                 reference: None,
//!                 latitude: Decimal::ZERO,
//!                 longitude: Decimal::ZERO,
//!             },
//!         );
//!         state.dishes.insert(
//!             RecordId::new(3),
//!             Dish {
//!                 id: RecordId::new(3),
//!                 name: "Turkey stew".to_string(),
//!                 unit_price: Decimal::new(800, 2),
//!             },
//!         );
//!     })
//!     .await;
//!
//! let orders = OrderService::new(store, config, Arc::new(TransitionTable::standard()));
//! let details = orders
//!     .create_order(CreateOrderRequest {
//!         customer_id: RecordId::new(1),
//!         address_id: RecordId::new(2),
//!         line_items: vec![LineItemRequest { dish_id: RecordId::new(3), quantity: 2 }],
//!         total: Decimal::new(1600, 2),
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(details.order.status, OrderStatus::Pending);
//! # });
//! ```

use crate::config::OrderCoreConfig;
use crate::database::{OrderStore, UnitOfWork};
use crate::error::{invariant_violation, not_found, validation, OrderError, OrderResult};
use crate::logging::{log_error, log_order_operation};
use crate::models::{
    LineItemRequest, Order, OrderDetails, OrderFilter, OrderLineItem, RecordId, MAX_MONEY,
};
use crate::state_machine::{OrderStateMachine, OrderStatus, TransitionTable};
use crate::utils::deadline::with_deadline;
use crate::validation::validate_positive_amount;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: RecordId,
    pub address_id: RecordId,
    pub line_items: Vec<LineItemRequest>,
    /// Client-computed total; must match the priced line items
    pub total: Decimal,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    config: Arc<OrderCoreConfig>,
    state_machine: OrderStateMachine,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        config: Arc<OrderCoreConfig>,
        table: Arc<TransitionTable>,
    ) -> Self {
        let state_machine = OrderStateMachine::new(store.clone(), config.clone(), table);
        Self {
            store,
            config,
            state_machine,
        }
    }

    pub fn state_machine(&self) -> &OrderStateMachine {
        &self.state_machine
    }

    /// Place an order in `pending` with its priced line items
    #[instrument(skip(self, request), fields(
        operation_id = %Uuid::new_v4(),
        customer_id = %request.customer_id,
    ))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> OrderResult<OrderDetails> {
        let result = with_deadline(
            self.config.transactions.operation_timeout(),
            self.create_order_inner(request),
        )
        .await;
        if let Err(err) = &result {
            log_error("create_order", err);
        }
        result
    }

    async fn create_order_inner(&self, request: CreateOrderRequest) -> OrderResult<OrderDetails> {
        if request.line_items.is_empty() {
            return Err(validation("line_items", "an order needs at least one line item"));
        }
        for item in &request.line_items {
            if item.quantity <= 0 {
                return Err(validation(
                    "line_items",
                    format!("quantity for dish {} must be positive, got {}", item.dish_id, item.quantity),
                ));
            }
        }
        validate_positive_amount("total", request.total)?;

        let mut uow = self.store.begin().await?;

        if !uow.customer_exists(request.customer_id).await? {
            return Err(not_found("customer", request.customer_id));
        }
        let address = uow
            .find_address(request.address_id)
            .await?
            .ok_or_else(|| not_found("address", request.address_id))?;
        if address.customer_id != request.customer_id {
            return Err(OrderError::Authorization {
                entity: "address",
                id: address.id.to_string(),
                customer_id: request.customer_id.to_string(),
            });
        }

        let now = Utc::now();
        let order = Order::new_pending(request.customer_id, address.id, request.total, now);
        let mut line_items = Vec::with_capacity(request.line_items.len());
        for item in &request.line_items {
            let dish = uow
                .find_dish(item.dish_id)
                .await?
                .ok_or_else(|| not_found("dish", item.dish_id))?;
            line_items.push(OrderLineItem::priced(order.id, &dish, item.quantity)?);
        }

        let computed = line_items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.subtotal))
            .filter(|sum| *sum <= MAX_MONEY)
            .ok_or_else(|| {
                validation("total", format!("line item sum exceeds the largest amount {MAX_MONEY}"))
            })?;
        if computed != request.total {
            return Err(validation(
                "total",
                format!("{} does not match the line item sum {computed}", request.total),
            ));
        }

        uow.insert_order(&order).await?;
        for item in &line_items {
            uow.insert_line_item(item).await?;
        }
        uow.commit().await?;

        log_order_operation(
            "create_order",
            Some(order.id),
            Some(order.customer_id),
            order.status.as_str(),
            Some(&format!("{} line items, total {}", line_items.len(), order.total)),
        );

        Ok(OrderDetails {
            order,
            line_items,
            address: Some(address),
            payment: None,
            delivery_control: None,
            specialized: None,
        })
    }

    /// Full aggregate view of one order
    pub async fn get_order(&self, order_id: RecordId) -> OrderResult<OrderDetails> {
        with_deadline(self.config.transactions.operation_timeout(), async {
            let mut uow = self.store.begin().await?;
            load_details(uow.as_mut(), order_id).await
        })
        .await
    }

    /// Orders matching `filter`, newest first. No match is an empty list.
    pub async fn list_orders(&self, filter: OrderFilter) -> OrderResult<Vec<Order>> {
        filter.validate()?;
        with_deadline(self.config.transactions.operation_timeout(), async {
            let mut uow = self.store.begin().await?;
            uow.list_orders(&filter).await
        })
        .await
    }

    /// Route a status change through the state machine
    pub async fn transition(&self, order_id: RecordId, new_status: OrderStatus) -> OrderResult<Order> {
        self.state_machine.transition(order_id, new_status).await
    }
}

async fn load_details(
    uow: &mut dyn UnitOfWork,
    order_id: RecordId,
) -> OrderResult<OrderDetails> {
    let order = uow
        .find_order(order_id)
        .await?
        .ok_or_else(|| not_found("order", order_id))?;
    let line_items = uow.line_items(order_id).await?;
    let address = match order.address_id {
        Some(address_id) => uow.find_address(address_id).await?,
        None => None,
    };
    let payment = uow.find_payment(order_id).await?;
    let delivery_control = uow.find_delivery_control(order_id).await?;
    let specialized = uow.find_specialized_order(order_id).await?;

    if order.includes_dishes && line_items.is_empty() {
        return Err(invariant_violation(format!(
            "order {order_id} includes dishes but has no line items"
        )));
    }

    Ok(OrderDetails {
        order,
        line_items,
        address,
        payment,
        delivery_control,
        specialized,
    })
}
