use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use acopio_core::{AggregateId, TenantId};
use acopio_events::EventEnvelope;
use acopio_materials::{MaterialEvent, MaterialId, MovementKind};

use crate::read_model::TenantStore;

/// Queryable material row: catalog data plus current balances.
///
/// `available_stock` counts released, issuable units; `in_quarantine`
/// counts received units still awaiting a quality decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialStockView {
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub requires_certificate: bool,
    pub available_stock: i64,
    pub in_quarantine: i64,
    pub average_unit_cost: Option<i64>,
    pub placement: Option<String>,
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum MaterialStockProjectionError {
    #[error("failed to deserialize material event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Material stock projection.
///
/// Folds the movement ledger into per-material balances. The request
/// service validates issue quantities against this view, so it must mirror
/// the aggregate's balance arithmetic exactly.
#[derive(Debug)]
pub struct MaterialStockProjection<S>
where
    S: TenantStore<MaterialId, MaterialStockView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> MaterialStockProjection<S>
where
    S: TenantStore<MaterialId, MaterialStockView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, material_id: &MaterialId) -> Option<MaterialStockView> {
        self.store.get(tenant_id, material_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<MaterialStockView> {
        self.store.list(tenant_id)
    }

    /// Find a material by normalized catalog name.
    pub fn find_by_name(&self, tenant_id: TenantId, name: &str) -> Option<MaterialStockView> {
        let key = acopio_materials::material_name_key(name);
        if key.is_empty() {
            return None;
        }
        self.store.list(tenant_id).into_iter().find(|v| v.name == key)
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), MaterialStockProjectionError> {
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
                return Err(MaterialStockProjectionError::NonMonotonicSequence {
                    last,
                    found: seq,
                });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(MaterialStockProjectionError::NonMonotonicSequence {
                    last,
                    found: seq,
                });
            }

            let ev: MaterialEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| MaterialStockProjectionError::Deserialize(e.to_string()))?;

            // Validate tenant isolation at the event level.
            let (event_tenant, material_id) = match &ev {
                MaterialEvent::MaterialCreated(e) => (e.tenant_id, e.material_id),
                MaterialEvent::IntakeStaged(e) => (e.tenant_id, e.material_id),
                MaterialEvent::MovementPosted(e) => (e.tenant_id, e.material_id),
            };

            if event_tenant != tenant_id {
                return Err(MaterialStockProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if material_id.0 != aggregate_id {
                return Err(MaterialStockProjectionError::TenantIsolation(
                    "event material_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match ev {
                MaterialEvent::MaterialCreated(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.material_id,
                        MaterialStockView {
                            material_id: e.material_id,
                            name: e.name,
                            unit: e.unit,
                            category: e.category,
                            requires_certificate: e.requires_certificate,
                            available_stock: 0,
                            in_quarantine: 0,
                            average_unit_cost: None,
                            placement: None,
                        },
                    );
                }
                MaterialEvent::IntakeStaged(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.material_id) {
                        view.in_quarantine += e.quantity;
                        self.store.upsert(tenant_id, e.material_id, view);
                    }
                }
                MaterialEvent::MovementPosted(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.material_id) {
                        let prev_available = view.available_stock;
                        view.available_stock += e.quantity_delta;
                        view.in_quarantine += e.staged_delta;

                        // Same fold as the aggregate: receipts with a cost
                        // re-blend the weighted average, purchase receipts
                        // refresh the placement.
                        if e.kind.is_receipt() && e.quantity_delta > 0 {
                            if let Some(cost) = e.unit_cost {
                                view.average_unit_cost = Some(blend_average(
                                    view.average_unit_cost,
                                    prev_available,
                                    cost,
                                    e.quantity_delta,
                                ));
                            }
                            if e.kind == MovementKind::PurchaseIn {
                                if let Some(dest) = &e.destination {
                                    view.placement = Some(dest.clone());
                                }
                            }
                        }

                        self.store.upsert(tenant_id, e.material_id, view);
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
    ) -> Result<(), MaterialStockProjectionError> {
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

/// Weighted moving average over the previously priced balance.
fn blend_average(current: Option<i64>, prev_qty: i64, cost: i64, incoming: i64) -> i64 {
    let prev_qty = prev_qty.max(0) as i128;
    let incoming = incoming as i128;
    let prev_avg = current.unwrap_or(cost) as i128;
    let total = prev_qty + incoming;
    if total == 0 {
        return cost;
    }
    ((prev_avg * prev_qty + cost as i128 * incoming) / total) as i64
}
