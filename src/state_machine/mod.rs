//! # Order State Machine
//!
//! The order lifecycle as an explicit transition table plus guards. Every
//! status change in the crate goes through [`OrderStateMachine`].
//!
//! ```text
//! pending -> in_preparation -> assigned -> in_transit -> delivered
//!    |             |              |            |
//!    +-------------+--------------+--> cancelled   +--> returned -> assigned
//!                                                          |
//!                                                          +--> cancelled
//! ```

pub mod guards;
pub mod order_state_machine;
pub mod states;
pub mod transitions;

pub use guards::{StateGuard, TerminalStateGuard, TransitionAllowedGuard};
pub use order_state_machine::OrderStateMachine;
pub use states::OrderStatus;
pub use transitions::TransitionTable;
