use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use acopio_core::{AggregateId, TenantId};
use acopio_events::EventEnvelope;
use acopio_providers::{ContactInfo, ProviderEvent, ProviderId, name_match_key, tax_id_match_key};

use crate::read_model::TenantStore;

/// Queryable provider directory row.
///
/// Carries the normalized match keys alongside the display values so
/// identity resolution can scan the directory without re-deriving them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderView {
    pub provider_id: ProviderId,
    pub name: String,
    pub tax_id: String,
    pub name_key: String,
    pub tax_id_key: String,
    pub contact: ContactInfo,
    pub registered_at: DateTime<Utc>,
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum ProviderProjectionError {
    #[error("failed to deserialize provider event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Provider directory projection.
///
/// Consumes published envelopes (JSON payloads) and maintains the
/// tenant-isolated directory the intake resolver matches against.
#[derive(Debug)]
pub struct ProviderProjection<S>
where
    S: TenantStore<ProviderId, ProviderView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> ProviderProjection<S>
where
    S: TenantStore<ProviderId, ProviderView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, provider_id: &ProviderId) -> Option<ProviderView> {
        self.store.get(tenant_id, provider_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ProviderView> {
        self.store.list(tenant_id)
    }

    /// Find a provider by normalized tax id.
    pub fn find_by_tax_id(&self, tenant_id: TenantId, tax_id: &str) -> Option<ProviderView> {
        let key = tax_id_match_key(tax_id);
        if key.is_empty() {
            return None;
        }
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|v| v.tax_id_key == key)
    }

    /// Find a provider by normalized display name.
    pub fn find_by_name(&self, tenant_id: TenantId, name: &str) -> Option<ProviderView> {
        let key = name_match_key(name);
        if key.is_empty() {
            return None;
        }
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|v| v.name_key == key)
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces tenant isolation
    /// - Enforces monotonic sequence per (tenant, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProviderProjectionError> {
        // Ignore non-provider aggregates (allows sharing a bus across modules).
        if envelope.aggregate_type() != "providers.provider" {
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
                return Err(ProviderProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                // First event may carry any positive sequence; after that we
                // enforce strict monotonic increments.
                return Err(ProviderProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let ev: ProviderEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProviderProjectionError::Deserialize(e.to_string()))?;

            // Validate tenant isolation at the event level.
            let (event_tenant, provider_id) = match &ev {
                ProviderEvent::ProviderRegistered(e) => (e.tenant_id, e.provider_id),
                ProviderEvent::ProviderContactUpdated(e) => (e.tenant_id, e.provider_id),
            };

            if event_tenant != tenant_id {
                return Err(ProviderProjectionError::TenantIsolation(
                    "event tenant_id does not match envelope tenant_id".to_string(),
                ));
            }

            if provider_id.0 != aggregate_id {
                return Err(ProviderProjectionError::TenantIsolation(
                    "event provider_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match ev {
                ProviderEvent::ProviderRegistered(e) => {
                    self.store.upsert(
                        tenant_id,
                        e.provider_id,
                        ProviderView {
                            provider_id: e.provider_id,
                            name_key: name_match_key(&e.name),
                            tax_id_key: tax_id_match_key(&e.tax_id),
                            name: e.name,
                            tax_id: e.tax_id,
                            contact: e.contact,
                            registered_at: e.occurred_at,
                        },
                    );
                }
                ProviderEvent::ProviderContactUpdated(e) => {
                    if let Some(mut view) = self.store.get(tenant_id, &e.provider_id) {
                        view.contact = e.contact;
                        self.store.upsert(tenant_id, e.provider_id, view);
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
    ) -> Result<(), ProviderProjectionError> {
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
