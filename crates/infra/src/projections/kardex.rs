use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use acopio_core::{AggregateId, TenantId};
use acopio_events::EventEnvelope;
use acopio_materials::{MaterialEvent, MaterialId, MovementKind};

use crate::read_model::TenantStore;
use crate::settings::MovementCodes;

/// One kardex row: a posted movement with its running balance.
///
/// `code` is the reporting reference code for receipt kinds (purchase,
/// transfer, surplus, reentry); issues and returns carry none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KardexEntry {
    pub movement_id: Uuid,
    pub material_id: MaterialId,
    pub sequence: u64,
    pub kind: MovementKind,
    pub code: Option<u16>,
    pub quantity: i64,
    pub quantity_delta: i64,
    pub balance_after: i64,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub reference: Option<String>,
    pub unit_cost: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum KardexProjectionError {
    #[error("failed to deserialize material event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Kardex projection: the per-material movement ledger in display form.
///
/// Rows are keyed by (material, stream sequence) because a transfer posts
/// two legs under one movement_id; the stream sequence is the unique key.
#[derive(Debug)]
pub struct KardexProjection<S>
where
    S: TenantStore<(MaterialId, u64), KardexEntry>,
{
    store: S,
    codes: MovementCodes,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> KardexProjection<S>
where
    S: TenantStore<(MaterialId, u64), KardexEntry>,
{
    pub fn new(store: S, codes: MovementCodes) -> Self {
        Self {
            store,
            codes,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Movement rows for one material, oldest first.
    pub fn list_for_material(&self, tenant_id: TenantId, material_id: MaterialId) -> Vec<KardexEntry> {
        let mut rows: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|e| e.material_id == material_id)
            .collect();
        rows.sort_by_key(|e| e.sequence);
        rows
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), KardexProjectionError> {
        // Ignore non-material aggregates (allows sharing a bus across modules).
        if envelope.aggregate_type() != "materials.material" {
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
                return Err(KardexProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(KardexProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: MaterialEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| KardexProjectionError::Deserialize(e.to_string()))?;

            // Validate tenant isolation at the event level.
            let (event_tenant, material_id) = match &ev {
                MaterialEvent::MaterialCreated(e) => (e.tenant_id, e.material_id),
                MaterialEvent::IntakeStaged(e) => (e.tenant_id, e.material_id),
                MaterialEvent::MovementPosted(e) => (e.tenant_id, e.material_id),
            };

            if event_tenant != tenant_id {
                return Err(KardexProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if material_id.0 != aggregate_id {
                return Err(KardexProjectionError::TenantIsolation(
                    "event material_id does not match envelope aggregate_id".to_string(),
                ));
            }

            // Only posted movements produce rows; catalog and staging events
            // just advance the cursor.
            if let MaterialEvent::MovementPosted(e) = ev {
                let balance_before = self
                    .store
                    .list(tenant_id)
                    .into_iter()
                    .filter(|r| r.material_id == e.material_id)
                    .max_by_key(|r| r.sequence)
                    .map(|r| r.balance_after)
                    .unwrap_or(0);

                self.store.upsert(
                    tenant_id,
                    (e.material_id, seq),
                    KardexEntry {
                        movement_id: e.movement_id,
                        material_id: e.material_id,
                        sequence: seq,
                        kind: e.kind,
                        code: self.codes.code_for(e.kind),
                        quantity: e.quantity,
                        quantity_delta: e.quantity_delta,
                        balance_after: balance_before + e.quantity_delta,
                        origin: e.origin,
                        destination: e.destination,
                        reference: e.reference,
                        unit_cost: e.unit_cost,
                        occurred_at: e.occurred_at,
                    },
                );
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
    ) -> Result<(), KardexProjectionError> {
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
