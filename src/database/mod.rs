//! # Persistence
//!
//! Store traits and their two implementations.
//!
//! - [`store`] - the `OrderStore` / `UnitOfWork` seam used by every service
//! - [`postgres`] - transactional PostgreSQL store with row-level order locks
//! - [`memory`] - single-writer in-memory store for tests and embedding
//! - [`connection`] - pool bootstrap, migrations and health checks

pub mod connection;
pub mod memory;
pub mod postgres;
pub mod store;

pub use connection::DatabaseConnection;
pub use memory::{InMemoryOrderStore, MemoryState, WriteTarget};
pub use postgres::PgOrderStore;
pub use store::{OrderStore, UnitOfWork};
