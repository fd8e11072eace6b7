use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acopio_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use acopio_events::Event;

/// Project identifier. Projects themselves are managed outside this system;
/// budget items and requests only reference them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub AggregateId);

impl ProjectId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Budget item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetItemId(pub AggregateId);

impl BudgetItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BudgetItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: BudgetItem.
///
/// Reference data for imputation. `theoretical_quantity` is the planned
/// allotment the efficiency advisory compares against; items without one
/// never raise advisories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetItem {
    id: BudgetItemId,
    tenant_id: Option<TenantId>,
    project_id: Option<ProjectId>,
    code: String,
    name: String,
    theoretical_quantity: Option<i64>,
    version: u64,
    created: bool,
}

impl BudgetItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BudgetItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            project_id: None,
            code: String::new(),
            name: String::new(),
            theoretical_quantity: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BudgetItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn theoretical_quantity(&self) -> Option<i64> {
        self.theoretical_quantity
    }
}

impl AggregateRoot for BudgetItem {
    type Id = BudgetItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterBudgetItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBudgetItem {
    pub tenant_id: TenantId,
    pub budget_item_id: BudgetItemId,
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub theoretical_quantity: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetItemCommand {
    RegisterBudgetItem(RegisterBudgetItem),
}

/// Event: BudgetItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetItemRegistered {
    pub tenant_id: TenantId,
    pub budget_item_id: BudgetItemId,
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub theoretical_quantity: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetItemEvent {
    BudgetItemRegistered(BudgetItemRegistered),
}

impl Event for BudgetItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BudgetItemEvent::BudgetItemRegistered(_) => "requests.budget_item.registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BudgetItemEvent::BudgetItemRegistered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BudgetItem {
    type Command = BudgetItemCommand;
    type Event = BudgetItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BudgetItemEvent::BudgetItemRegistered(e) => {
                self.id = e.budget_item_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.theoretical_quantity = e.theoretical_quantity;
                self.created = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BudgetItemCommand::RegisterBudgetItem(cmd) => self.handle_register(cmd),
        }
    }
}

impl BudgetItem {
    fn handle_register(
        &self,
        cmd: &RegisterBudgetItem,
    ) -> Result<Vec<BudgetItemEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("budget item already exists"));
        }

        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("budget item code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("budget item name cannot be empty"));
        }
        if let Some(qty) = cmd.theoretical_quantity {
            if qty <= 0 {
                return Err(DomainError::validation(
                    "theoretical quantity must be positive when given",
                ));
            }
        }

        Ok(vec![BudgetItemEvent::BudgetItemRegistered(
            BudgetItemRegistered {
                tenant_id: cmd.tenant_id,
                budget_item_id: cmd.budget_item_id,
                project_id: cmd.project_id,
                code: cmd.code.trim().to_string(),
                name: cmd.name.trim().to_string(),
                theoretical_quantity: cmd.theoretical_quantity,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
