//! Tenant-isolated read model storage.
//!
//! Read models here are disposable: every view (stock levels, kardex rows,
//! quarantine queues) is a fold over the event log and can be rebuilt from
//! scratch. The store abstraction keeps projections and services ignorant
//! of where the views live.

pub mod tenant_store;

pub use tenant_store::{InMemoryTenantStore, TenantStore};
