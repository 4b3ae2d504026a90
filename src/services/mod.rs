//! # Services
//!
//! The operations exposed to the API layer. Each operation runs in exactly
//! one unit of work under the configured deadline and takes the order's
//! write lock before changing anything about it.

pub mod delivery_assignment;
pub mod order_service;
pub mod specialized_order_composer;

pub use delivery_assignment::DeliveryAssignmentEngine;
pub use order_service::{CreateOrderRequest, OrderService};
pub use specialized_order_composer::{
    CategoryCount, CompositionSummary, SpecializedOrderComposer, SpecializedOrderCreated,
    SpecializedOrderRequest,
};
