use super::states::OrderStatus;
use super::transitions::TransitionTable;
use crate::error::{OrderError, OrderResult};
use crate::models::Order;

/// Trait for implementing state transition guards
pub trait StateGuard: Send + Sync {
    /// Reject the transition of `order` to `target` with an error, or allow it
    fn check(&self, order: &Order, target: OrderStatus, table: &TransitionTable)
        -> OrderResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Terminal orders never move again, whatever a custom table says
pub struct TerminalStateGuard;

impl StateGuard for TerminalStateGuard {
    fn check(&self, order: &Order, target: OrderStatus, _table: &TransitionTable) -> OrderResult<()> {
        if order.status.is_terminal() {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Terminal orders accept no transitions"
    }
}

/// The target must be listed for the current status
pub struct TransitionAllowedGuard;

impl StateGuard for TransitionAllowedGuard {
    fn check(&self, order: &Order, target: OrderStatus, table: &TransitionTable) -> OrderResult<()> {
        if !table.is_allowed(order.status, target) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Target status must be allowed by the transition table"
    }
}
