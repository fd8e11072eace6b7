//! Cross-aggregate orchestration.
//!
//! Aggregates stay pure and single-stream; everything that spans streams
//! (identity resolution, the intake pipeline, quality decisions posting
//! stock movements, request dispatch) lives here. Services dispatch
//! commands through the [`CommandDispatcher`] and fold the committed
//! envelopes straight into the read models, so a caller that writes and
//! immediately reads sees its own effect. The background subscriber
//! delivers the same envelopes again; projection cursors absorb the
//! duplicates.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use acopio_events::{EventEnvelope, InMemoryEventBus};
use acopio_materials::MaterialId;
use acopio_procurement::DocumentId;
use acopio_providers::ProviderId;
use acopio_quality::QuarantineId;
use acopio_requests::{BudgetItemId, RequestId};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::projections::{
    BudgetItemProjection, BudgetItemView, DocumentProjection, DocumentView, KardexEntry,
    KardexProjection, MaterialStockProjection, MaterialStockView, ProviderProjection,
    ProviderView, QuarantineQueueProjection, QuarantineRecordView, RequestProjection, RequestView,
};
use crate::read_model::InMemoryTenantStore;
use crate::settings::MovementCodes;

mod identity;
mod intake;
mod quality;
mod requests;
mod stock;

pub use identity::{IdentityResolver, MaterialResolution, Resolution};
pub use intake::{
    DocumentSubmission, IntakeReceipt, IntakeService, LineReceipt, SubmissionLine, SubmitOutcome,
};
pub use quality::{QualityDecision, QualityService};
pub use requests::{FiledRequest, RequestService, RequestSubmission, RequestLineSubmission};
pub use stock::{MovementRequest, StockService};

/// Event store handle shared across services. The concrete backend is
/// picked at startup from [`crate::settings::EventStoreBackend`].
pub type SharedStore = Arc<dyn EventStore>;

/// All runtimes publish through the in-process bus; projections and any
/// external tail subscribe to it.
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub type Dispatcher = CommandDispatcher<SharedStore, SharedBus>;

pub type ProviderDirectory = ProviderProjection<Arc<InMemoryTenantStore<ProviderId, ProviderView>>>;
pub type MaterialCatalog =
    MaterialStockProjection<Arc<InMemoryTenantStore<MaterialId, MaterialStockView>>>;
pub type KardexLedger = KardexProjection<Arc<InMemoryTenantStore<(MaterialId, u64), KardexEntry>>>;
pub type DocumentDirectory = DocumentProjection<Arc<InMemoryTenantStore<DocumentId, DocumentView>>>;
pub type QuarantineQueue =
    QuarantineQueueProjection<Arc<InMemoryTenantStore<QuarantineId, QuarantineRecordView>>>;
pub type RequestBook = RequestProjection<Arc<InMemoryTenantStore<RequestId, RequestView>>>;
pub type BudgetBook = BudgetItemProjection<Arc<InMemoryTenantStore<BudgetItemId, BudgetItemView>>>;

/// The full set of read models, routed by aggregate type.
///
/// Read models are in-memory in every store mode; with a durable event
/// store they are rebuilt at startup by replaying [`EventStore::load_all`].
pub struct ProjectionSet {
    pub providers: ProviderDirectory,
    pub materials: MaterialCatalog,
    pub kardex: KardexLedger,
    pub documents: DocumentDirectory,
    pub quarantine: QuarantineQueue,
    pub requests: RequestBook,
    pub budget_items: BudgetBook,
}

impl ProjectionSet {
    pub fn in_memory(codes: MovementCodes) -> Self {
        Self {
            providers: ProviderProjection::new(Arc::new(InMemoryTenantStore::new())),
            materials: MaterialStockProjection::new(Arc::new(InMemoryTenantStore::new())),
            kardex: KardexProjection::new(Arc::new(InMemoryTenantStore::new()), codes),
            documents: DocumentProjection::new(Arc::new(InMemoryTenantStore::new())),
            quarantine: QuarantineQueueProjection::new(Arc::new(InMemoryTenantStore::new())),
            requests: RequestProjection::new(Arc::new(InMemoryTenantStore::new())),
            budget_items: BudgetItemProjection::new(Arc::new(InMemoryTenantStore::new())),
        }
    }

    /// Route one envelope to every projection interested in its aggregate
    /// type. Material streams feed both the stock catalog and the kardex.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), String> {
        match envelope.aggregate_type() {
            "providers.provider" => self
                .providers
                .apply_envelope(envelope)
                .map_err(|e| e.to_string()),
            "materials.material" => {
                self.materials
                    .apply_envelope(envelope)
                    .map_err(|e| e.to_string())?;
                self.kardex
                    .apply_envelope(envelope)
                    .map_err(|e| e.to_string())
            }
            "procurement.document" => self
                .documents
                .apply_envelope(envelope)
                .map_err(|e| e.to_string()),
            "quality.quarantine" => self
                .quarantine
                .apply_envelope(envelope)
                .map_err(|e| e.to_string()),
            "requests.request" => self
                .requests
                .apply_envelope(envelope)
                .map_err(|e| e.to_string()),
            "requests.budget_item" => self
                .budget_items
                .apply_envelope(envelope)
                .map_err(|e| e.to_string()),
            // Mapping book streams have no projection; resolution
            // rehydrates the aggregate directly.
            _ => Ok(()),
        }
    }

    /// Fold freshly committed events in, right after a dispatch.
    ///
    /// Failures here are logged, not returned: the store already accepted
    /// the events, and the subscriber will deliver them again anyway.
    pub fn apply_committed(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(e) = self.apply_envelope(&stored.to_envelope()) {
                tracing::warn!(
                    aggregate_type = stored.aggregate_type.as_str(),
                    sequence_number = stored.sequence_number,
                    "inline projection apply failed: {e}"
                );
            }
        }
    }

    /// Replay the whole event log into empty read models at startup.
    pub fn replay_all(&self, store: &dyn EventStore) -> Result<usize, EventStoreError> {
        let log = store.load_all()?;
        let count = log.len();
        for stored in &log {
            if let Err(e) = self.apply_envelope(&stored.to_envelope()) {
                tracing::warn!(
                    aggregate_type = stored.aggregate_type.as_str(),
                    sequence_number = stored.sequence_number,
                    "startup replay skipped an envelope: {e}"
                );
            }
        }
        Ok(count)
    }
}
