//! Append-only event store boundary.
//!
//! Storage-agnostic abstraction over tenant-scoped event streams, with an
//! in-memory implementation for tests/single-process runs and a Postgres
//! implementation for durable deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
