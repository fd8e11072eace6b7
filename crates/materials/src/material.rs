use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use acopio_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use acopio_events::Event;

/// Material identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub AggregateId);

impl MaterialId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MaterialId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Canonical catalog key: trimmed, uppercased.
///
/// "cemento gris tipo i" and "CEMENTO GRIS TIPO I" are the same material.
pub fn material_name_key(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Stock movement taxonomy.
///
/// Behavior keys off the sign/stock-check class only; the warehouse
/// reference codes (101, 311, 501, 601) are reporting metadata supplied by
/// runtime settings, never matched on here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    /// Quality release of received goods into available stock.
    PurchaseIn,
    /// Previously issued material coming back.
    Reentry,
    /// Inventory-count surplus.
    Surplus,
    /// Issue to a consumption destination (project burn).
    IssueConsumption,
    /// Issue of a tool/asset.
    IssueAsset,
    /// Between-location transfer: negative at origin, and a second positive
    /// entry at the destination when the destination is tracked.
    Transfer,
    /// Quarantine reject counter-entry: reduces the staged quantity only,
    /// never the available balance (PENDING receipts are off-ledger).
    Return,
}

impl MovementKind {
    /// Kinds that add received goods to available stock (and may re-cost it).
    pub fn is_receipt(self) -> bool {
        matches!(
            self,
            MovementKind::PurchaseIn | MovementKind::Reentry | MovementKind::Surplus
        )
    }

    /// Kinds that take from available stock and must pass the
    /// insufficient-stock check.
    pub fn consumes_available(self) -> bool {
        matches!(
            self,
            MovementKind::IssueConsumption | MovementKind::IssueAsset | MovementKind::Transfer
        )
    }
}

/// Aggregate root: Material.
///
/// Carries the catalog fields plus two balances:
/// - `available_stock`: the on-ledger balance, fold of movement deltas;
/// - `in_quarantine`: goods received but pending a quality decision
///   (off-ledger; staged at intake, cleared by release or return).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    id: MaterialId,
    tenant_id: Option<TenantId>,
    name: String,
    unit: String,
    category: String,
    requires_certificate: bool,
    average_unit_cost: Option<i64>,
    available_stock: i64,
    in_quarantine: i64,
    placement: Option<String>,
    version: u64,
    created: bool,
}

impl Material {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MaterialId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            unit: String::new(),
            category: String::new(),
            requires_certificate: false,
            average_unit_cost: None,
            available_stock: 0,
            in_quarantine: 0,
            placement: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MaterialId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn requires_certificate(&self) -> bool {
        self.requires_certificate
    }

    /// Weighted moving-average unit cost in cents, if any priced receipt
    /// has been posted.
    pub fn average_unit_cost(&self) -> Option<i64> {
        self.average_unit_cost
    }

    pub fn available_stock(&self) -> i64 {
        self.available_stock
    }

    pub fn in_quarantine(&self) -> i64 {
        self.in_quarantine
    }

    /// Last storage placement assigned by a quality release.
    pub fn placement(&self) -> Option<&str> {
        self.placement.as_deref()
    }
}

impl AggregateRoot for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMaterial {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub requires_certificate: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StageIntake.
///
/// Stages a received quantity into the quarantine balance at intake commit.
/// Not a stock movement: PENDING receipts never touch `available_stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageIntake {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub quantity: i64,
    /// Source quarantine record or document reference, for the audit trail.
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMovement {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    /// Correlates the legs of a transfer and the kardex row(s) of one post.
    pub movement_id: Uuid,
    pub kind: MovementKind,
    /// Always positive; the engine assigns the sign per kind.
    pub quantity: i64,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub reference: Option<String>,
    /// Unit cost in cents for priced receipts (drives the moving average).
    pub unit_cost: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialCommand {
    CreateMaterial(CreateMaterial),
    StageIntake(StageIntake),
    PostMovement(PostMovement),
}

/// Event: MaterialCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialCreated {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub category: String,
    pub requires_certificate: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: IntakeStaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeStaged {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub quantity: i64,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementPosted. One kardex row.
///
/// `quantity_delta` is the signed effect on `available_stock` and
/// `staged_delta` the signed effect on `in_quarantine`; both are computed by
/// `handle` so replaying the stream folds balances without re-deciding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPosted {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub movement_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i64,
    pub quantity_delta: i64,
    pub staged_delta: i64,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub reference: Option<String>,
    pub unit_cost: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialEvent {
    MaterialCreated(MaterialCreated),
    IntakeStaged(IntakeStaged),
    MovementPosted(MovementPosted),
}

impl Event for MaterialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MaterialEvent::MaterialCreated(_) => "materials.material.created",
            MaterialEvent::IntakeStaged(_) => "materials.material.intake_staged",
            MaterialEvent::MovementPosted(_) => "materials.material.movement_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MaterialEvent::MaterialCreated(e) => e.occurred_at,
            MaterialEvent::IntakeStaged(e) => e.occurred_at,
            MaterialEvent::MovementPosted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Material {
    type Command = MaterialCommand;
    type Event = MaterialEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MaterialEvent::MaterialCreated(e) => {
                self.id = e.material_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.category = e.category.clone();
                self.requires_certificate = e.requires_certificate;
                self.available_stock = 0;
                self.in_quarantine = 0;
                self.created = true;
            }
            MaterialEvent::IntakeStaged(e) => {
                self.in_quarantine += e.quantity;
            }
            MaterialEvent::MovementPosted(e) => {
                let prev_available = self.available_stock;
                self.available_stock += e.quantity_delta;
                self.in_quarantine += e.staged_delta;

                if e.kind.is_receipt() && e.quantity_delta > 0 {
                    if let Some(cost) = e.unit_cost {
                        self.average_unit_cost =
                            Some(blend_average(self.average_unit_cost, prev_available, cost, e.quantity_delta));
                    }
                    if e.kind == MovementKind::PurchaseIn {
                        if let Some(dest) = &e.destination {
                            self.placement = Some(dest.clone());
                        }
                    }
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MaterialCommand::CreateMaterial(cmd) => self.handle_create(cmd),
            MaterialCommand::StageIntake(cmd) => self.handle_stage(cmd),
            MaterialCommand::PostMovement(cmd) => self.handle_post_movement(cmd),
        }
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

impl Material {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_material_id(&self, material_id: MaterialId) -> Result<(), DomainError> {
        if self.id != material_id {
            return Err(DomainError::invariant("material_id mismatch"));
        }
        Ok(())
    }

    fn ensure_available(&self, requested: i64) -> Result<(), DomainError> {
        if requested > self.available_stock {
            return Err(DomainError::insufficient_stock(
                self.available_stock,
                requested,
            ));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("material already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("material name cannot be empty"));
        }
        if cmd.unit.trim().is_empty() {
            return Err(DomainError::validation("material unit cannot be empty"));
        }

        Ok(vec![MaterialEvent::MaterialCreated(MaterialCreated {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            name: material_name_key(&cmd.name),
            unit: cmd.unit.trim().to_string(),
            category: cmd.category.trim().to_string(),
            requires_certificate: cmd.requires_certificate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_stage(&self, cmd: &StageIntake) -> Result<Vec<MaterialEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_material_id(cmd.material_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("staged quantity must be positive"));
        }

        Ok(vec![MaterialEvent::IntakeStaged(IntakeStaged {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post_movement(&self, cmd: &PostMovement) -> Result<Vec<MaterialEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_material_id(cmd.material_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("movement quantity must be positive"));
        }

        match cmd.kind {
            MovementKind::PurchaseIn | MovementKind::Reentry | MovementKind::Surplus => {
                // A purchase-in drains whatever this quantity had staged in
                // quarantine; direct receipts outside the inspection flow
                // simply have nothing staged.
                let staged_delta = if cmd.kind == MovementKind::PurchaseIn {
                    -(cmd.quantity.min(self.in_quarantine))
                } else {
                    0
                };
                Ok(vec![self.movement_event(cmd, cmd.quantity, staged_delta)])
            }
            MovementKind::IssueConsumption | MovementKind::IssueAsset => {
                self.ensure_available(cmd.quantity)?;
                Ok(vec![self.movement_event(cmd, -cmd.quantity, 0)])
            }
            MovementKind::Transfer => {
                if cmd.origin.is_none() {
                    return Err(DomainError::validation(
                        "transfer requires an origin location",
                    ));
                }
                self.ensure_available(cmd.quantity)?;

                let mut events = vec![self.movement_event(cmd, -cmd.quantity, 0)];
                // Tracked destination: post the corresponding positive entry
                // in the same batch so both legs commit atomically.
                if cmd.destination.is_some() {
                    events.push(self.movement_event(cmd, cmd.quantity, 0));
                }
                Ok(events)
            }
            MovementKind::Return => {
                if cmd.quantity > self.in_quarantine {
                    return Err(DomainError::invariant(
                        "return exceeds staged quarantine quantity",
                    ));
                }
                Ok(vec![self.movement_event(cmd, 0, -cmd.quantity)])
            }
        }
    }

    fn movement_event(
        &self,
        cmd: &PostMovement,
        quantity_delta: i64,
        staged_delta: i64,
    ) -> MaterialEvent {
        MaterialEvent::MovementPosted(MovementPosted {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            movement_id: cmd.movement_id,
            kind: cmd.kind,
            quantity: cmd.quantity,
            quantity_delta,
            staged_delta,
            origin: cmd.origin.clone(),
            destination: cmd.destination.clone(),
            reference: cmd.reference.clone(),
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })
    }
}
