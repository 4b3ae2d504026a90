#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pet Order Core
//!
//! Order lifecycle, courier assignment and specialized diet-order composition
//! for a pet-food delivery service.
//!
//! ## Overview
//!
//! The crate owns the parts of the delivery service with real invariants:
//!
//! - an order moves through a fixed status graph and only through it
//! - each order has at most one delivery control record, created on first
//!   assignment and reassigned afterwards
//! - a specialized order and the pet profile records it introduces are
//!   written together or not at all
//!
//! Authentication, catalog and profile management, file storage and
//! notifications are external collaborators. The API layer in front of this
//! crate passes in already-authenticated customer ids and stored file handles.
//!
//! ## Module Organization
//!
//! - [`models`] - orders, delivery control, specialized orders and pet profile records
//! - [`state_machine`] - status enumeration, transition table, guards and the order state machine
//! - [`database`] - store traits with PostgreSQL and in-memory implementations
//! - [`services`] - order aggregate, delivery assignment engine and specialized order composer
//! - [`config`] - layered configuration
//! - [`error`] - error taxonomy with stable kinds
//! - [`logging`] - structured logging setup and event helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pet_order_core::config::OrderCoreConfig;
//! use pet_order_core::database::InMemoryOrderStore;
//! use pet_order_core::services::DeliveryAssignmentEngine;
//! use pet_order_core::models::RecordId;
//! use pet_order_core::state_machine::TransitionTable;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(OrderCoreConfig::default());
//! let store = Arc::new(InMemoryOrderStore::new(config.transactions.lock_timeout()));
//! let engine = DeliveryAssignmentEngine::new(store, config, Arc::new(TransitionTable::standard()));
//!
//! let outcome = engine.assign(RecordId::new(1), RecordId::new(7)).await?;
//! println!("order is now {}", outcome.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                 # unit and in-memory integration tests
//! cargo test -- --ignored    # PostgreSQL store tests, needs DATABASE_URL
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state_machine;
pub mod utils;
pub mod validation;

pub use config::{ConfigLoader, ConfigurationError, OrderCoreConfig};
pub use database::{InMemoryOrderStore, OrderStore, PgOrderStore, UnitOfWork};
pub use error::{ErrorKind, OrderError, OrderResult};
pub use models::{DeliveryControl, Order, OrderDetails, RecordId, SpecializedOrder};
pub use services::{DeliveryAssignmentEngine, OrderService, SpecializedOrderComposer};
pub use state_machine::{OrderStateMachine, OrderStatus, TransitionTable};
