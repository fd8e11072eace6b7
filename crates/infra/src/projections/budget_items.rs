use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use acopio_core::{AggregateId, TenantId};
use acopio_events::EventEnvelope;
use acopio_requests::{BudgetItemEvent, BudgetItemId, ProjectId};

use crate::read_model::TenantStore;

/// Queryable budget item row (project cost-control line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetItemView {
    pub budget_item_id: BudgetItemId,
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub theoretical_quantity: Option<i64>,
    pub registered_at: DateTime<Utc>,
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum BudgetItemProjectionError {
    #[error("failed to deserialize budget item event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Budget item projection: imputation targets for material requests.
#[derive(Debug)]
pub struct BudgetItemProjection<S>
where
    S: TenantStore<BudgetItemId, BudgetItemView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> BudgetItemProjection<S>
where
    S: TenantStore<BudgetItemId, BudgetItemView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, budget_item_id: &BudgetItemId) -> Option<BudgetItemView> {
        self.store.get(tenant_id, budget_item_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<BudgetItemView> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BudgetItemProjectionError> {
        // Ignore non-budget aggregates (allows sharing a bus across modules).
        if envelope.aggregate_type() != "requests.budget_item" {
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
                return Err(BudgetItemProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(BudgetItemProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: BudgetItemEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| BudgetItemProjectionError::Deserialize(e.to_string()))?;

            let BudgetItemEvent::BudgetItemRegistered(e) = ev;

            if e.tenant_id != tenant_id {
                return Err(BudgetItemProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if e.budget_item_id.0 != aggregate_id {
                return Err(BudgetItemProjectionError::TenantIsolation(
                    "event budget_item_id does not match envelope aggregate_id".to_string(),
                ));
            }

            self.store.upsert(
                tenant_id,
                e.budget_item_id,
                BudgetItemView {
                    budget_item_id: e.budget_item_id,
                    project_id: e.project_id,
                    code: e.code,
                    name: e.name,
                    theoretical_quantity: e.theoretical_quantity,
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
    ) -> Result<(), BudgetItemProjectionError> {
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
