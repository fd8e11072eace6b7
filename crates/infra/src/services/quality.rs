//! Quality decisions and their stock effects.
//!
//! The quarantine aggregate owns the decision gates (one decision ever,
//! certificate for gated materials, remarks on rejection, full location or
//! none). This service dispatches the decision first, then posts the
//! resulting stock movement from the committed event: a release becomes a
//! priced `PURCHASE_IN` into the recorded location, a rejection becomes a
//! `RETURN` that clears the staged count.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use acopio_core::{DomainError, TenantId};
use acopio_materials::{Material, MaterialCommand, MaterialId, MovementKind, PostMovement};
use acopio_quality::{
    Decide, DecisionKind, QuarantineCommand, QuarantineEvent, QuarantineId, QuarantineRecord,
};

use crate::command_dispatcher::DispatchError;
use crate::projections::QuarantineRecordView;
use crate::services::{Dispatcher, ProjectionSet};
use crate::settings::Settings;

/// Inspector input for one pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityDecision {
    pub kind: DecisionKind,
    pub aisle: Option<String>,
    pub shelf: Option<String>,
    pub level: Option<String>,
    pub remarks: Option<String>,
    pub certificate_ref: Option<String>,
}

pub struct QualityService {
    dispatcher: Arc<Dispatcher>,
    projections: Arc<ProjectionSet>,
    settings: Settings,
}

impl QualityService {
    pub fn new(dispatcher: Arc<Dispatcher>, projections: Arc<ProjectionSet>, settings: Settings) -> Self {
        Self {
            dispatcher,
            projections,
            settings,
        }
    }

    /// Decide a pending quarantine record and post its stock effect.
    ///
    /// The decision commits before any movement; if the movement dispatch
    /// fails the record stays decided and the movement can be retried from
    /// the event log.
    pub fn decide(
        &self,
        tenant_id: TenantId,
        quarantine_id: QuarantineId,
        decision: QualityDecision,
    ) -> Result<QuarantineRecordView, DispatchError> {
        let occurred_at = Utc::now();
        let command = QuarantineCommand::Decide(Decide {
            tenant_id,
            quarantine_id,
            kind: decision.kind,
            aisle: decision.aisle,
            shelf: decision.shelf,
            level: decision.level,
            remarks: decision.remarks,
            certificate_ref: decision.certificate_ref,
            general_area: self.settings.general_area.clone(),
            occurred_at,
        });
        let committed = self.dispatcher.dispatch::<QuarantineRecord>(
            tenant_id,
            quarantine_id.0,
            "quality.quarantine",
            command,
            |_, id| QuarantineRecord::empty(QuarantineId::new(id)),
        )?;
        self.projections.apply_committed(&committed);

        for stored in &committed {
            let event: QuarantineEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            match event {
                QuarantineEvent::QuarantineReleased(e) => {
                    self.post_decision_movement(
                        tenant_id,
                        e.material_id,
                        MovementKind::PurchaseIn,
                        e.physical_count,
                        Some(e.location_label.clone()),
                        quarantine_id,
                        e.unit_cost,
                    )?;
                    tracing::info!(
                        tenant_id = %tenant_id.as_uuid(),
                        quarantine_id = %quarantine_id,
                        material_id = %e.material_id,
                        quantity = e.physical_count,
                        location = e.location_label.as_str(),
                        "quarantine released into stock"
                    );
                }
                QuarantineEvent::QuarantineReturned(e) => {
                    self.post_decision_movement(
                        tenant_id,
                        e.material_id,
                        MovementKind::Return,
                        e.physical_count,
                        None,
                        quarantine_id,
                        None,
                    )?;
                    tracing::info!(
                        tenant_id = %tenant_id.as_uuid(),
                        quarantine_id = %quarantine_id,
                        material_id = %e.material_id,
                        quantity = e.physical_count,
                        "quarantine rejected, goods returned to provider"
                    );
                }
                QuarantineEvent::QuarantineOpened(_) => {}
            }
        }

        self.projections
            .quarantine
            .get(tenant_id, &quarantine_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    fn post_decision_movement(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
        kind: MovementKind,
        quantity: i64,
        destination: Option<String>,
        quarantine_id: QuarantineId,
        unit_cost: Option<i64>,
    ) -> Result<(), DispatchError> {
        let command = MaterialCommand::PostMovement(PostMovement {
            tenant_id,
            material_id,
            movement_id: Uuid::now_v7(),
            kind,
            quantity,
            origin: None,
            destination,
            reference: Some(quarantine_id.to_string()),
            unit_cost,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatcher.dispatch::<Material>(
            tenant_id,
            material_id.0,
            "materials.material",
            command,
            |_, id| Material::empty(MaterialId::new(id)),
        )?;
        self.projections.apply_committed(&committed);
        Ok(())
    }
}
