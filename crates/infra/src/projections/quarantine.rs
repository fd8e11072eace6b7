use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use acopio_core::{AggregateId, TenantId};
use acopio_events::EventEnvelope;
use acopio_materials::MaterialId;
use acopio_procurement::DocumentId;
use acopio_quality::{QuarantineEvent, QuarantineId, QuarantineStatus};

use crate::read_model::TenantStore;

/// Queryable quarantine record: one received line awaiting (or past) its
/// quality decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineRecordView {
    pub quarantine_id: QuarantineId,
    pub material_id: MaterialId,
    pub document_id: DocumentId,
    pub line_no: u32,
    pub physical_count: i64,
    pub requires_certificate: bool,
    pub unit_cost: Option<i64>,
    pub certificate_ref: Option<String>,
    pub status: QuarantineStatus,
    pub location_label: Option<String>,
    pub remarks: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum QuarantineQueueProjectionError {
    #[error("failed to deserialize quarantine event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Quarantine queue projection.
///
/// The inspector's worklist: everything received and pending, plus the
/// decision history for released and returned records.
#[derive(Debug)]
pub struct QuarantineQueueProjection<S>
where
    S: TenantStore<QuarantineId, QuarantineRecordView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> QuarantineQueueProjection<S>
where
    S: TenantStore<QuarantineId, QuarantineRecordView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        quarantine_id: &QuarantineId,
    ) -> Option<QuarantineRecordView> {
        self.store.get(tenant_id, quarantine_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<QuarantineRecordView> {
        self.store.list(tenant_id)
    }

    /// Records filtered by status (e.g. the pending worklist).
    pub fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: QuarantineStatus,
    ) -> Vec<QuarantineRecordView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|v| v.status == status)
            .collect()
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), QuarantineQueueProjectionError> {
        // Ignore non-quarantine aggregates (allows sharing a bus across modules).
        if envelope.aggregate_type() != "quality.quarantine" {
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
                return Err(QuarantineQueueProjectionError::NonMonotonicSequence {
                    last,
                    found: seq,
                });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(QuarantineQueueProjectionError::NonMonotonicSequence {
                    last,
                    found: seq,
                });
            }

            let ev: QuarantineEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| QuarantineQueueProjectionError::Deserialize(e.to_string()))?;

            // Validate tenant isolation at the event level.
            let (event_tenant, quarantine_id) = match &ev {
                QuarantineEvent::QuarantineOpened(e) => (e.tenant_id, e.quarantine_id),
                QuarantineEvent::QuarantineReleased(e) => (e.tenant_id, e.quarantine_id),
                QuarantineEvent::QuarantineReturned(e) => (e.tenant_id, e.quarantine_id),
            };

            if event_tenant != tenant_id {
                return Err(QuarantineQueueProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if quarantine_id.0 != aggregate_id {
                return Err(QuarantineQueueProjectionError::TenantIsolation(
                    "event quarantine_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match ev {
                QuarantineEvent::QuarantineOpened(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.quarantine_id,
                        QuarantineRecordView {
                            quarantine_id: e.quarantine_id,
                            material_id: e.material_id,
                            document_id: e.document_id,
                            line_no: e.line_no,
                            physical_count: e.physical_count,
                            requires_certificate: e.requires_certificate,
                            unit_cost: e.unit_cost,
                            certificate_ref: e.certificate_ref,
                            status: QuarantineStatus::Pending,
                            location_label: None,
                            remarks: None,
                            opened_at: e.occurred_at,
                            decided_at: None,
                        },
                    );
                }
                QuarantineEvent::QuarantineReleased(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.quarantine_id) {
                        view.status = e.grade.status();
                        view.location_label = Some(e.location_label);
                        view.remarks = e.remarks;
                        view.certificate_ref = e.certificate_ref;
                        view.decided_at = Some(e.occurred_at);
                        self.store.upsert(tenant_id, e.quarantine_id, view);
                    }
                }
                QuarantineEvent::QuarantineReturned(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.quarantine_id) {
                        view.status = QuarantineStatus::Returned;
                        view.remarks = Some(e.remarks);
                        view.decided_at = Some(e.occurred_at);
                        self.store.upsert(tenant_id, e.quarantine_id, view);
                    }
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), QuarantineQueueProjectionError> {
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
