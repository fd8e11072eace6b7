use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use acopio_core::{AggregateId, TenantId};
use acopio_events::EventEnvelope;
use acopio_requests::{
    BudgetItemId, ProjectId, RequestEvent, RequestId, RequestLine, RequestStatus, RequestType,
};

use crate::read_model::TenantStore;

/// Queryable material request row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestView {
    pub request_id: RequestId,
    pub project_id: ProjectId,
    pub budget_item_id: Option<BudgetItemId>,
    pub requester: String,
    pub request_type: RequestType,
    pub lines: Vec<RequestLine>,
    pub status: RequestStatus,
    pub filed_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum RequestProjectionError {
    #[error("failed to deserialize request event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Material request projection (filed and dispatched requests).
#[derive(Debug)]
pub struct RequestProjection<S>
where
    S: TenantStore<RequestId, RequestView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> RequestProjection<S>
where
    S: TenantStore<RequestId, RequestView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, request_id: &RequestId) -> Option<RequestView> {
        self.store.get(tenant_id, request_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<RequestView> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), RequestProjectionError> {
        // Ignore non-request aggregates (allows sharing a bus across modules).
        if envelope.aggregate_type() != "requests.request" {
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
                return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: RequestEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| RequestProjectionError::Deserialize(e.to_string()))?;

            // Validate tenant isolation at the event level.
            let (event_tenant, request_id) = match &ev {
                RequestEvent::RequestFiled(e) => (e.tenant_id, e.request_id),
                RequestEvent::RequestDispatched(e) => (e.tenant_id, e.request_id),
            };

            if event_tenant != tenant_id {
                return Err(RequestProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if request_id.0 != aggregate_id {
                return Err(RequestProjectionError::TenantIsolation(
                    "event request_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match ev {
                RequestEvent::RequestFiled(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.request_id,
                        RequestView {
                            request_id: e.request_id,
                            project_id: e.project_id,
                            budget_item_id: e.budget_item_id,
                            requester: e.requester,
                            request_type: e.request_type,
                            lines: e.lines,
                            status: RequestStatus::Requested,
                            filed_at: e.occurred_at,
                            dispatched_at: None,
                        },
                    );
                }
                RequestEvent::RequestDispatched(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.request_id) {
                        view.status = RequestStatus::Dispatched;
                        view.dispatched_at = Some(e.occurred_at);
                        self.store.upsert(tenant_id, e.request_id, view);
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
    ) -> Result<(), RequestProjectionError> {
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
