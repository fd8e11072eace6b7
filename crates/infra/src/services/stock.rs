//! Direct stock movements and transfers.
//!
//! Thin wrapper over the material aggregate's movement engine: the sign
//! conventions, insufficient-stock gate and cost blending all live in the
//! aggregate. This service assigns the movement id, dispatches and hands
//! back the refreshed stock view.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use acopio_core::{DomainError, TenantId};
use acopio_materials::{Material, MaterialCommand, MaterialId, MovementKind, PostMovement};

use crate::command_dispatcher::DispatchError;
use crate::projections::MaterialStockView;
use crate::services::{Dispatcher, ProjectionSet};

/// One movement to post. Quantity is always positive; the kind decides
/// the sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub material_id: MaterialId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub reference: Option<String>,
    /// Unit cost in cents; only meaningful on receipt kinds.
    pub unit_cost: Option<i64>,
}

pub struct StockService {
    dispatcher: Arc<Dispatcher>,
    projections: Arc<ProjectionSet>,
}

impl StockService {
    pub fn new(dispatcher: Arc<Dispatcher>, projections: Arc<ProjectionSet>) -> Self {
        Self {
            dispatcher,
            projections,
        }
    }

    pub fn post_movement(
        &self,
        tenant_id: TenantId,
        request: MovementRequest,
    ) -> Result<MaterialStockView, DispatchError> {
        let material_id = request.material_id;
        let command = MaterialCommand::PostMovement(PostMovement {
            tenant_id,
            material_id,
            movement_id: Uuid::now_v7(),
            kind: request.kind,
            quantity: request.quantity,
            origin: request.origin,
            destination: request.destination,
            reference: request.reference,
            unit_cost: request.unit_cost,
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

        tracing::debug!(
            tenant_id = %tenant_id.as_uuid(),
            material_id = %material_id,
            kind = ?request.kind,
            quantity = request.quantity,
            "stock movement posted"
        );
        self.projections
            .materials
            .get(tenant_id, &material_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    /// Between-location transfer. One command; the aggregate emits the
    /// negative origin leg and, when a destination is given, the positive
    /// destination leg under the same movement id.
    pub fn transfer(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
        quantity: i64,
        origin: String,
        destination: Option<String>,
        reference: Option<String>,
    ) -> Result<MaterialStockView, DispatchError> {
        self.post_movement(
            tenant_id,
            MovementRequest {
                material_id,
                kind: MovementKind::Transfer,
                quantity,
                origin: Some(origin),
                destination,
                reference,
                unit_cost: None,
            },
        )
    }
}
