use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use acopio_core::{AggregateId, TenantId};
use acopio_events::EventEnvelope;
use acopio_procurement::{
    DocumentId, DocumentLine, PurchaseDocumentEvent, invoice_number_key,
};
use acopio_providers::ProviderId;

use crate::read_model::TenantStore;

/// Queryable purchase document row (the committed intake result).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentView {
    pub document_id: DocumentId,
    pub provider_id: ProviderId,
    pub invoice_number: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub purchase_order_ref: Option<String>,
    pub delivery_note_ref: Option<String>,
    pub vehicle_plate: Option<String>,
    pub support_document_ref: Option<String>,
    pub lines: Vec<DocumentLine>,
    pub total_net: i64,
    pub total_amount: i64,
    pub tax_rate_percent: Option<u16>,
    pub registered_at: DateTime<Utc>,
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum DocumentProjectionError {
    #[error("failed to deserialize document event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Purchase document projection.
///
/// Backs the intake listing endpoints and the duplicate gate's "does this
/// provider already have this invoice" lookup.
#[derive(Debug)]
pub struct DocumentProjection<S>
where
    S: TenantStore<DocumentId, DocumentView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> DocumentProjection<S>
where
    S: TenantStore<DocumentId, DocumentView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, document_id: &DocumentId) -> Option<DocumentView> {
        self.store.get(tenant_id, document_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<DocumentView> {
        self.store.list(tenant_id)
    }

    /// Find a registered document by provider and normalized invoice number.
    pub fn find_by_invoice(
        &self,
        tenant_id: TenantId,
        provider_id: ProviderId,
        invoice_number: &str,
    ) -> Option<DocumentView> {
        let key = invoice_number_key(invoice_number);
        if key.is_empty() {
            return None;
        }
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|v| v.provider_id == provider_id && invoice_number_key(&v.invoice_number) == key)
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), DocumentProjectionError> {
        // Ignore non-document aggregates (allows sharing a bus across modules).
        if envelope.aggregate_type() != "procurement.document" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // Cursor check (per tenant + aggregate stream).
        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                tenant_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(DocumentProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(DocumentProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: PurchaseDocumentEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| DocumentProjectionError::Deserialize(e.to_string()))?;

            let PurchaseDocumentEvent::DocumentRegistered(e) = ev;

            if e.tenant_id != tenant_id {
                return Err(DocumentProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if e.document_id.0 != aggregate_id {
                return Err(DocumentProjectionError::TenantIsolation(
                    "event document_id does not match envelope aggregate_id".to_string(),
                ));
            }

            self.store.upsert(
                tenant_id,
                e.document_id,
                DocumentView {
                    document_id: e.document_id,
                    provider_id: e.provider_id,
                    invoice_number: e.invoice_number,
                    issue_date: e.issue_date,
                    received_at: e.received_at,
                    purchase_order_ref: e.purchase_order_ref,
                    delivery_note_ref: e.delivery_note_ref,
                    vehicle_plate: e.vehicle_plate,
                    support_document_ref: e.support_document_ref,
                    lines: e.lines,
                    total_net: e.total_net,
                    total_amount: e.total_amount,
                    tax_rate_percent: e.tax_rate_percent,
                    registered_at: e.occurred_at,
                },
            );

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), DocumentProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Clear read model per tenant before rebuilding.
        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
            }
        }

        // Deterministic replay order: tenant, aggregate, sequence.
        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
