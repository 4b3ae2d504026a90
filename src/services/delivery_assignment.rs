//! # Delivery Assignment Engine
//!
//! Owns the delivery control record of each order and keeps order status in
//! step with assignment, confirmation and return events.
//!
//! Assignment is an explicit two-branch operation: an existing control record
//! is reassigned (courier replaced, timestamp refreshed, confirmation reset),
//! otherwise a new record is created. Status is then driven toward
//! `assigned` through the state machine unless the order is already at or
//! past that point, so reassigning an order in transit never regresses it.

use crate::config::OrderCoreConfig;
use crate::database::{OrderStore, UnitOfWork};
use crate::error::{invariant_violation, not_found, OrderError, OrderResult};
use crate::logging::{log_delivery_operation, log_error};
use crate::models::{Courier, DeliveryAssignment, DeliveryControl, DeliveryOutcome, Order, RecordId};
use crate::state_machine::{OrderStateMachine, OrderStatus, TransitionTable};
use crate::utils::deadline::with_deadline;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct DeliveryAssignmentEngine {
    store: Arc<dyn OrderStore>,
    config: Arc<OrderCoreConfig>,
    state_machine: OrderStateMachine,
}

impl DeliveryAssignmentEngine {
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

    async fn run<T>(
        &self,
        operation: &str,
        work: impl Future<Output = OrderResult<T>>,
    ) -> OrderResult<T> {
        let result = with_deadline(self.config.transactions.operation_timeout(), work).await;
        if let Err(err) = &result {
            log_error(operation, err);
        }
        result
    }

    /// Attach `courier_id` to the order, creating or reassigning its control
    #[instrument(skip(self), fields(operation_id = %Uuid::new_v4()))]
    pub async fn assign(&self, order_id: RecordId, courier_id: RecordId) -> OrderResult<DeliveryOutcome> {
        self.run("assign", async {
            let mut uow = self.store.begin().await?;
            let mut order = lock_existing_order(uow.as_mut(), order_id).await?;
            let courier = uow
                .find_courier(courier_id)
                .await?
                .ok_or_else(|| not_found("courier", courier_id))?;

            let path = if order.status.is_assigned_or_later() {
                Vec::new()
            } else {
                self.state_machine.plan_path(&order, OrderStatus::Assigned)?
            };

            let now = Utc::now();
            let control = match uow.find_delivery_control(order_id).await? {
                Some(mut control) => {
                    control.reassign(courier.id, now);
                    uow.update_delivery_control(&control).await?;
                    control
                }
                None => {
                    let control = DeliveryControl::assigned(order_id, courier.id, now);
                    uow.insert_delivery_control(&control).await?;
                    control
                }
            };

            for hop in path {
                self.state_machine.apply(uow.as_mut(), &mut order, hop).await?;
            }
            uow.commit().await?;

            log_delivery_operation(
                "assign",
                order_id,
                Some(courier.id),
                order.status.as_str(),
                control.delivery_confirmed,
            );
            Ok(DeliveryOutcome {
                order_id,
                status: order.status,
                control,
                courier: Some(courier),
                unchanged: false,
            })
        })
        .await
    }

    /// Record delivery. Repeating the call on a confirmed order is a no-op.
    #[instrument(skip(self), fields(operation_id = %Uuid::new_v4()))]
    pub async fn confirm_delivery(&self, order_id: RecordId) -> OrderResult<DeliveryOutcome> {
        self.run("confirm_delivery", async {
            let mut uow = self.store.begin().await?;
            let mut order = lock_existing_order(uow.as_mut(), order_id).await?;
            let mut control = existing_control(uow.as_mut(), order_id).await?;
            let courier = control_courier(uow.as_mut(), &control).await?;

            let path = match order.status {
                OrderStatus::Delivered if control.delivery_confirmed => {
                    return Ok(DeliveryOutcome {
                        order_id,
                        status: order.status,
                        control,
                        courier,
                        unchanged: true,
                    });
                }
                // Reassigned after delivery; only the flag is missing
                OrderStatus::Delivered => Vec::new(),
                OrderStatus::Assigned | OrderStatus::InTransit => {
                    self.state_machine.plan_path(&order, OrderStatus::Delivered)?
                }
                other => {
                    return Err(OrderError::InvalidTransition {
                        from: other,
                        to: OrderStatus::Delivered,
                    })
                }
            };

            control.confirm(Utc::now());
            uow.update_delivery_control(&control).await?;
            for hop in path {
                self.state_machine.apply(uow.as_mut(), &mut order, hop).await?;
            }
            uow.commit().await?;

            log_delivery_operation(
                "confirm_delivery",
                order_id,
                control.courier_id,
                order.status.as_str(),
                control.delivery_confirmed,
            );
            Ok(DeliveryOutcome {
                order_id,
                status: order.status,
                control,
                courier,
                unchanged: false,
            })
        })
        .await
    }

    /// Record that the courier brought the order back undelivered
    #[instrument(skip(self), fields(operation_id = %Uuid::new_v4()))]
    pub async fn mark_returned(&self, order_id: RecordId) -> OrderResult<DeliveryOutcome> {
        self.run("mark_returned", async {
            let mut uow = self.store.begin().await?;
            let mut order = lock_existing_order(uow.as_mut(), order_id).await?;
            let mut control = existing_control(uow.as_mut(), order_id).await?;
            let courier = control_courier(uow.as_mut(), &control).await?;

            let path = match order.status {
                OrderStatus::Returned => {
                    return Ok(DeliveryOutcome {
                        order_id,
                        status: order.status,
                        control,
                        courier,
                        unchanged: true,
                    });
                }
                OrderStatus::Assigned | OrderStatus::InTransit => {
                    self.state_machine.plan_path(&order, OrderStatus::Returned)?
                }
                other => {
                    return Err(OrderError::InvalidTransition {
                        from: other,
                        to: OrderStatus::Returned,
                    })
                }
            };

            control.mark_returned(Utc::now());
            uow.update_delivery_control(&control).await?;
            for hop in path {
                self.state_machine.apply(uow.as_mut(), &mut order, hop).await?;
            }
            uow.commit().await?;

            log_delivery_operation(
                "mark_returned",
                order_id,
                control.courier_id,
                order.status.as_str(),
                control.delivery_confirmed,
            );
            Ok(DeliveryOutcome {
                order_id,
                status: order.status,
                control,
                courier,
                unchanged: false,
            })
        })
        .await
    }

    /// Control record of one order with its courier and order status
    pub async fn delivery_control(&self, order_id: RecordId) -> OrderResult<DeliveryAssignment> {
        self.run("delivery_control", async {
            let mut uow = self.store.begin().await?;
            let control = existing_control(uow.as_mut(), order_id).await?;
            assignment_view(uow.as_mut(), control).await
        })
        .await
    }

    /// Every control record, most recently touched first
    pub async fn list_assignments(&self) -> OrderResult<Vec<DeliveryAssignment>> {
        self.run("list_assignments", async {
            let mut uow = self.store.begin().await?;
            let mut controls = uow.list_delivery_controls(None).await?;
            controls.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            assignment_views(uow.as_mut(), controls).await
        })
        .await
    }

    /// Unconfirmed deliveries still with the courier, oldest order first
    pub async fn courier_pending_deliveries(
        &self,
        courier_id: RecordId,
    ) -> OrderResult<Vec<DeliveryAssignment>> {
        self.run("courier_pending_deliveries", async {
            let mut uow = self.store.begin().await?;
            existing_courier(uow.as_mut(), courier_id).await?;
            let controls = uow.list_delivery_controls(Some(courier_id)).await?;
            let mut views = assignment_views(uow.as_mut(), controls).await?;
            views.retain(|view| {
                !view.control.delivery_confirmed
                    && matches!(view.order_status, OrderStatus::Assigned | OrderStatus::InTransit)
            });
            views.sort_by(|a, b| a.order_created_at.cmp(&b.order_created_at));
            Ok(views)
        })
        .await
    }

    /// Finished deliveries of the courier, delivered or returned, newest first
    pub async fn courier_history(&self, courier_id: RecordId) -> OrderResult<Vec<DeliveryAssignment>> {
        self.run("courier_history", async {
            let mut uow = self.store.begin().await?;
            existing_courier(uow.as_mut(), courier_id).await?;
            let controls = uow.list_delivery_controls(Some(courier_id)).await?;
            let mut views = assignment_views(uow.as_mut(), controls).await?;
            views.retain(|view| {
                matches!(view.order_status, OrderStatus::Delivered | OrderStatus::Returned)
            });
            views.sort_by(|a, b| b.control.updated_at.cmp(&a.control.updated_at));
            Ok(views)
        })
        .await
    }
}

async fn lock_existing_order(uow: &mut dyn UnitOfWork, order_id: RecordId) -> OrderResult<Order> {
    uow.lock_order(order_id)
        .await?
        .ok_or_else(|| not_found("order", order_id))
}

async fn existing_control(
    uow: &mut dyn UnitOfWork,
    order_id: RecordId,
) -> OrderResult<DeliveryControl> {
    uow.find_delivery_control(order_id)
        .await?
        .ok_or_else(|| not_found("delivery control for order", order_id))
}

async fn existing_courier(uow: &mut dyn UnitOfWork, courier_id: RecordId) -> OrderResult<Courier> {
    uow.find_courier(courier_id)
        .await?
        .ok_or_else(|| not_found("courier", courier_id))
}

async fn control_courier(
    uow: &mut dyn UnitOfWork,
    control: &DeliveryControl,
) -> OrderResult<Option<Courier>> {
    match control.courier_id {
        Some(courier_id) => uow.find_courier(courier_id).await,
        None => Ok(None),
    }
}

async fn assignment_view(
    uow: &mut dyn UnitOfWork,
    control: DeliveryControl,
) -> OrderResult<DeliveryAssignment> {
    let order = uow.find_order(control.order_id).await?.ok_or_else(|| {
        invariant_violation(format!(
            "delivery control {} references missing order {}",
            control.id, control.order_id
        ))
    })?;
    let courier = control_courier(uow, &control).await?;
    Ok(DeliveryAssignment {
        order_status: order.status,
        order_created_at: order.created_at,
        order_total: order.total,
        customer_id: order.customer_id,
        address_id: order.address_id,
        courier,
        control,
    })
}

async fn assignment_views(
    uow: &mut dyn UnitOfWork,
    controls: Vec<DeliveryControl>,
) -> OrderResult<Vec<DeliveryAssignment>> {
    let mut views = Vec::with_capacity(controls.len());
    for control in controls {
        views.push(assignment_view(uow, control).await?);
    }
    Ok(views)
}
