//! Provider and material identity resolution.
//!
//! Intake paperwork names things free-form; the ledger needs one row per
//! real-world entity. Resolution funnels every spelling through the same
//! lookup order and only creates when nothing matches, under a per-tenant
//! lock so two concurrent intakes cannot race each other into duplicates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use acopio_core::{Aggregate, AggregateId, DomainError, TenantId};
use acopio_materials::{
    CreateMaterial, MappingBook, MappingBookCommand, MappingBookEvent, MappingBookId,
    MappingSource, Material, MaterialCommand, MaterialId, RecordMapping,
};
use acopio_providers::{ContactInfo, Provider, ProviderCommand, ProviderId, RegisterProvider};

use crate::command_dispatcher::DispatchError;
use crate::projections::{MaterialStockView, ProviderView};
use crate::services::{Dispatcher, ProjectionSet, SharedStore};

const DEFAULT_UNIT: &str = "UNIT";
const DEFAULT_CATEGORY: &str = "GENERAL";

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<T> {
    Existing(T),
    Created(T),
}

impl<T: Copy> Resolution<T> {
    pub fn id(&self) -> T {
        match self {
            Resolution::Existing(id) | Resolution::Created(id) => *id,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}

/// Material resolution result, with the route that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialResolution {
    pub resolution: Resolution<MaterialId>,
    /// True when a learned mapping answered before the catalog was consulted.
    pub from_mapping: bool,
}

impl MaterialResolution {
    pub fn material_id(&self) -> MaterialId {
        self.resolution.id()
    }
}

/// Resolves free-form provider and material text to canonical ids,
/// creating catalog entries on first sight.
pub struct IdentityResolver {
    dispatcher: Arc<Dispatcher>,
    projections: Arc<ProjectionSet>,
    store: SharedStore,
    tenant_locks: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

/// The mapping book is a per-tenant singleton; deriving its id from the
/// tenant id keeps the stream address stable across restarts without a
/// registry of book ids.
pub fn mapping_book_id(tenant_id: TenantId) -> MappingBookId {
    MappingBookId::new(AggregateId::from_uuid(*tenant_id.as_uuid()))
}

impl IdentityResolver {
    pub fn new(dispatcher: Arc<Dispatcher>, projections: Arc<ProjectionSet>, store: SharedStore) -> Self {
        Self {
            dispatcher,
            projections,
            store,
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    fn tenant_lock(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        let mut locks = self
            .tenant_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(tenant_id).or_default().clone()
    }

    /// Resolve a provider by tax id first, then by normalized name.
    ///
    /// Lookup, miss detection and creation run under the tenant lock so
    /// concurrent intakes for the same provider converge on one row.
    pub fn resolve_provider(
        &self,
        tenant_id: TenantId,
        name: &str,
        tax_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<Resolution<ProviderId>, DispatchError> {
        let lock = self.tenant_lock(tenant_id);
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(view) = self.projections.providers.find_by_tax_id(tenant_id, tax_id) {
            return Ok(Resolution::Existing(view.provider_id));
        }
        if let Some(view) = self.projections.providers.find_by_name(tenant_id, name) {
            return Ok(Resolution::Existing(view.provider_id));
        }

        let provider_id = self.create_provider(tenant_id, name, tax_id, None, occurred_at)?;
        Ok(Resolution::Created(provider_id))
    }

    /// Explicit catalog registration. Unlike [`Self::resolve_provider`],
    /// an existing match is a conflict rather than an answer.
    pub fn register_provider(
        &self,
        tenant_id: TenantId,
        name: &str,
        tax_id: &str,
        contact: Option<ContactInfo>,
        occurred_at: DateTime<Utc>,
    ) -> Result<ProviderView, DispatchError> {
        let lock = self.tenant_lock(tenant_id);
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self
            .projections
            .providers
            .find_by_tax_id(tenant_id, tax_id)
            .is_some()
        {
            return Err(DomainError::conflict("provider with this tax id already exists").into());
        }

        let provider_id = self.create_provider(tenant_id, name, tax_id, contact, occurred_at)?;
        self.projections
            .providers
            .get(tenant_id, &provider_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    fn create_provider(
        &self,
        tenant_id: TenantId,
        name: &str,
        tax_id: &str,
        contact: Option<ContactInfo>,
        occurred_at: DateTime<Utc>,
    ) -> Result<ProviderId, DispatchError> {
        let provider_id = ProviderId::new(AggregateId::new());
        let command = ProviderCommand::RegisterProvider(RegisterProvider {
            tenant_id,
            provider_id,
            name: name.to_string(),
            tax_id: tax_id.to_string(),
            contact,
            occurred_at,
        });
        let committed = self.dispatcher.dispatch::<Provider>(
            tenant_id,
            provider_id.0,
            "providers.provider",
            command,
            |_, id| Provider::empty(ProviderId::new(id)),
        )?;
        self.projections.apply_committed(&committed);

        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            provider_id = %provider_id,
            "registered previously unseen provider"
        );
        Ok(provider_id)
    }

    /// Explicit catalog registration of a material, with the unit, category
    /// and certificate requirement intake auto-creation cannot know.
    /// An existing name match is a conflict rather than an answer.
    pub fn register_material(
        &self,
        tenant_id: TenantId,
        name: &str,
        unit: &str,
        category: &str,
        requires_certificate: bool,
        occurred_at: DateTime<Utc>,
    ) -> Result<MaterialStockView, DispatchError> {
        let lock = self.tenant_lock(tenant_id);
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self
            .projections
            .materials
            .find_by_name(tenant_id, name)
            .is_some()
        {
            return Err(DomainError::conflict("material with this name already exists").into());
        }

        let material_id = MaterialId::new(AggregateId::new());
        let command = MaterialCommand::CreateMaterial(CreateMaterial {
            tenant_id,
            material_id,
            name: name.to_string(),
            unit: unit.to_string(),
            category: category.to_string(),
            requires_certificate,
            occurred_at,
        });
        let committed = self.dispatcher.dispatch::<Material>(
            tenant_id,
            material_id.0,
            "materials.material",
            command,
            |_, id| Material::empty(MaterialId::new(id)),
        )?;
        self.projections.apply_committed(&committed);

        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            material_id = %material_id,
            "material registered in the catalog"
        );
        self.projections
            .materials
            .get(tenant_id, &material_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    /// Resolve raw invoice text to a material id.
    ///
    /// Lookup order: the tenant's learned mapping book, then an exact
    /// normalized-name match in the catalog, then creation of a new
    /// material plus a learned mapping for the raw text.
    pub fn resolve_material(
        &self,
        tenant_id: TenantId,
        raw_text: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<MaterialResolution, DispatchError> {
        let lock = self.tenant_lock(tenant_id);
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let book = self.load_mapping_book(tenant_id)?;
        if let Some(material_id) = book.resolve(raw_text) {
            return Ok(MaterialResolution {
                resolution: Resolution::Existing(material_id),
                from_mapping: true,
            });
        }

        if let Some(view) = self.projections.materials.find_by_name(tenant_id, raw_text) {
            return Ok(MaterialResolution {
                resolution: Resolution::Existing(view.material_id),
                from_mapping: false,
            });
        }

        let material_id = MaterialId::new(AggregateId::new());
        let command = MaterialCommand::CreateMaterial(CreateMaterial {
            tenant_id,
            material_id,
            name: raw_text.to_string(),
            unit: DEFAULT_UNIT.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            requires_certificate: false,
            occurred_at,
        });
        let committed = self.dispatcher.dispatch::<Material>(
            tenant_id,
            material_id.0,
            "materials.material",
            command,
            |_, id| Material::empty(MaterialId::new(id)),
        )?;
        self.projections.apply_committed(&committed);

        self.record_mapping(tenant_id, raw_text, material_id, MappingSource::Learned, occurred_at)?;
        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            material_id = %material_id,
            "created material for unseen invoice text"
        );
        Ok(MaterialResolution {
            resolution: Resolution::Created(material_id),
            from_mapping: false,
        })
    }

    /// Reviewer override: point raw text at a different catalog material.
    /// Future resolutions of that text follow the override; past documents
    /// keep the ids they were registered with.
    pub fn override_mapping(
        &self,
        tenant_id: TenantId,
        raw_text: &str,
        material_id: MaterialId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let lock = self.tenant_lock(tenant_id);
        let _held = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self
            .projections
            .materials
            .get(tenant_id, &material_id)
            .is_none()
        {
            return Err(DispatchError::Domain(DomainError::NotFound));
        }

        self.record_mapping(tenant_id, raw_text, material_id, MappingSource::Override, occurred_at)?;
        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            material_id = %material_id,
            "mapping overridden by reviewer"
        );
        Ok(())
    }

    fn record_mapping(
        &self,
        tenant_id: TenantId,
        raw_text: &str,
        material_id: MaterialId,
        source: MappingSource,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let book_id = mapping_book_id(tenant_id);
        let command = MappingBookCommand::RecordMapping(RecordMapping {
            tenant_id,
            book_id,
            raw_text: raw_text.to_string(),
            material_id,
            source,
            occurred_at,
        });
        let committed = self.dispatcher.dispatch::<MappingBook>(
            tenant_id,
            book_id.0,
            "materials.mapping_book",
            command,
            |_, id| MappingBook::empty(MappingBookId::new(id)),
        )?;
        self.projections.apply_committed(&committed);
        Ok(())
    }

    fn load_mapping_book(&self, tenant_id: TenantId) -> Result<MappingBook, DispatchError> {
        let book_id = mapping_book_id(tenant_id);
        let history = self.store.load_stream(tenant_id, book_id.0)?;
        let mut book = MappingBook::empty(book_id);
        for stored in &history {
            let event: MappingBookEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            book.apply(&event);
        }
        Ok(book)
    }
}
