//! Projection implementations (read model builders).
//!
//! Projections consume published domain events and build query-optimized,
//! tenant-isolated read models. All projections are:
//! - **Rebuildable**: reconstructed from the event stream at any time
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: safe for at-least-once delivery
//!
//! The API wires every projection to the same event bus subscription; each
//! projection filters on its own aggregate type and ignores the rest.

pub mod budget_items;
pub mod documents;
pub mod kardex;
pub mod materials;
pub mod providers;
pub mod quarantine;
pub mod requests;

pub use budget_items::{BudgetItemProjection, BudgetItemProjectionError, BudgetItemView};
pub use documents::{DocumentProjection, DocumentProjectionError, DocumentView};
pub use kardex::{KardexEntry, KardexProjection, KardexProjectionError};
pub use materials::{MaterialStockProjection, MaterialStockProjectionError, MaterialStockView};
pub use providers::{ProviderProjection, ProviderProjectionError, ProviderView};
pub use quarantine::{QuarantineQueueProjection, QuarantineQueueProjectionError, QuarantineRecordView};
pub use requests::{RequestProjection, RequestProjectionError, RequestView};
