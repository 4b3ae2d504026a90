use super::guards::{StateGuard, TerminalStateGuard, TransitionAllowedGuard};
use super::states::OrderStatus;
use super::transitions::TransitionTable;
use crate::config::OrderCoreConfig;
use crate::database::{OrderStore, UnitOfWork};
use crate::error::{invariant_violation, not_found, validation, OrderError, OrderResult};
use crate::logging::{log_error, log_order_operation};
use crate::models::{Order, RecordId};
use crate::utils::deadline::with_deadline;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// The single authority for order status changes.
///
/// Other components never write a status themselves; they call [`apply`] or
/// [`drive_to`] inside their own unit of work so that status and the records
/// that go with it commit together.
///
/// [`apply`]: OrderStateMachine::apply
/// [`drive_to`]: OrderStateMachine::drive_to
#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<dyn OrderStore>,
    config: Arc<OrderCoreConfig>,
    table: Arc<TransitionTable>,
    guards: Arc<Vec<Box<dyn StateGuard>>>,
}

impl OrderStateMachine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        config: Arc<OrderCoreConfig>,
        table: Arc<TransitionTable>,
    ) -> Self {
        let guards: Vec<Box<dyn StateGuard>> =
            vec![Box::new(TerminalStateGuard), Box::new(TransitionAllowedGuard)];
        Self {
            store,
            config,
            table,
            guards: Arc::new(guards),
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    fn ensure_known(&self, order: &Order) -> OrderResult<()> {
        if !self.table.contains(order.status) {
            return Err(invariant_violation(format!(
                "order {} is in status '{}' which has no transition table entry",
                order.id, order.status
            )));
        }
        Ok(())
    }

    /// Validate a single transition without writing anything
    pub fn check(&self, order: &Order, target: OrderStatus) -> OrderResult<()> {
        self.ensure_known(order)?;
        for guard in self.guards.iter() {
            if let Err(err) = guard.check(order, target, &self.table) {
                debug!(
                    order_id = %order.id,
                    from = %order.status,
                    to = %target,
                    guard = guard.description(),
                    "Transition rejected by guard"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// Validate and persist one transition within the caller's unit of work
    pub async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &mut Order,
        target: OrderStatus,
    ) -> OrderResult<()> {
        self.check(order, target)?;
        uow.update_order_status(order.id, target).await?;
        debug!(order_id = %order.id, from = %order.status, to = %target, "Order status applied");
        order.status = target;
        Ok(())
    }

    /// Hops that would take `order` to `target`, without writing anything.
    ///
    /// Empty when the order is already there.
    pub fn plan_path(&self, order: &Order, target: OrderStatus) -> OrderResult<Vec<OrderStatus>> {
        self.ensure_known(order)?;
        self.table
            .shortest_path(order.status, target)
            .ok_or(OrderError::InvalidTransition {
                from: order.status,
                to: target,
            })
    }

    /// Move `order` to `target` along the shortest legal path, one applied
    /// transition per hop
    pub async fn drive_to(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &mut Order,
        target: OrderStatus,
    ) -> OrderResult<Vec<OrderStatus>> {
        let path = self.plan_path(order, target)?;
        for &hop in &path {
            self.apply(uow, order, hop).await?;
        }
        Ok(path)
    }

    /// Load the order under its write lock and move it to `new_status`
    #[instrument(skip(self), fields(operation_id = %Uuid::new_v4()))]
    pub async fn transition(&self, order_id: RecordId, new_status: OrderStatus) -> OrderResult<Order> {
        let result = with_deadline(self.config.transactions.operation_timeout(), async {
            let mut uow = self.store.begin().await?;
            let mut order = uow
                .lock_order(order_id)
                .await?
                .ok_or_else(|| not_found("order", order_id))?;
            let from = order.status;
            self.apply(uow.as_mut(), &mut order, new_status).await?;
            uow.commit().await?;

            log_order_operation(
                "transition",
                Some(order.id),
                Some(order.customer_id),
                order.status.as_str(),
                Some(&format!("{from} -> {new_status}")),
            );
            Ok(order)
        })
        .await;

        if let Err(err) = &result {
            log_error("transition", err);
        }
        result
    }

    /// [`transition`](Self::transition) with the target given by name
    pub async fn transition_named(&self, order_id: RecordId, new_status: &str) -> OrderResult<Order> {
        let target = new_status
            .parse::<OrderStatus>()
            .map_err(|reason| validation("status", reason))?;
        self.transition(order_id, target).await
    }

    pub async fn current_status(&self, order_id: RecordId) -> OrderResult<OrderStatus> {
        with_deadline(self.config.transactions.operation_timeout(), async {
            let mut uow = self.store.begin().await?;
            let order = uow
                .find_order(order_id)
                .await?
                .ok_or_else(|| not_found("order", order_id))?;
            Ok(order.status)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryOrderStore;
    use crate::models::RecordId;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;

    async fn machine_with_order(
        table: TransitionTable,
        status: OrderStatus,
    ) -> (OrderStateMachine, InMemoryOrderStore, RecordId) {
        let store = InMemoryOrderStore::new(Duration::from_millis(200));
        let mut order = Order::new_pending(
            RecordId::new(1),
            RecordId::new(2),
            Decimal::new(1000, 2),
            Utc::now(),
        );
        order.status = status;
        let order_id = order.id;
        store
            .modify(|state| {
                state.orders.insert(order.id, order);
            })
            .await;
        let machine = OrderStateMachine::new(
            Arc::new(store.clone()),
            Arc::new(OrderCoreConfig::default()),
            Arc::new(table),
        );
        (machine, store, order_id)
    }

    #[tokio::test]
    async fn test_transition_persists_new_status() {
        let (machine, store, order_id) =
            machine_with_order(TransitionTable::standard(), OrderStatus::Pending).await;
        let order = machine
            .transition(order_id, OrderStatus::InPreparation)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::InPreparation);
        assert_eq!(
            store.snapshot().await.orders[&order_id].status,
            OrderStatus::InPreparation
        );
    }

    #[tokio::test]
    async fn test_status_missing_from_table_is_invariant_violation() {
        let table = TransitionTable::from_entries([(OrderStatus::Pending, vec![OrderStatus::Cancelled])]);
        let (machine, store, order_id) = machine_with_order(table, OrderStatus::InTransit).await;
        let err = machine
            .transition(order_id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvariantViolation(_)));
        assert_eq!(
            store.snapshot().await.orders[&order_id].status,
            OrderStatus::InTransit
        );
    }

    #[tokio::test]
    async fn test_unknown_status_name_is_validation_error() {
        let (machine, _store, order_id) =
            machine_with_order(TransitionTable::standard(), OrderStatus::Pending).await;
        let err = machine.transition_named(order_id, "shipped").await.unwrap_err();
        assert!(matches!(err, OrderError::Validation { ref field, .. } if field == "status"));
    }

    #[tokio::test]
    async fn test_missing_order() {
        let (machine, _store, _) =
            machine_with_order(TransitionTable::standard(), OrderStatus::Pending).await;
        let err = machine
            .transition(RecordId::new(999), OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_plan_path_for_cancelled_order() {
        let (machine, _store, _) =
            machine_with_order(TransitionTable::standard(), OrderStatus::Pending).await;
        let mut order = Order::new_specialized(RecordId::new(1), Utc::now());
        order.status = OrderStatus::Cancelled;
        let err = machine.plan_path(&order, OrderStatus::Assigned).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }
}
