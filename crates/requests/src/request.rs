use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acopio_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use acopio_events::Event;
use acopio_materials::MaterialId;

use crate::budget::{BudgetItemId, ProjectId};

/// Material request identifier (tenant-scoped via `tenant_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub AggregateId);

impl RequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What the withdrawn material becomes. EPP (personal protective equipment)
/// requests are exempt from budget imputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Consumption,
    Asset,
    Epp,
}

impl RequestType {
    pub fn requires_budget_item(self) -> bool {
        self != RequestType::Epp
    }
}

/// Request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Requested,
    Dispatched,
}

/// Requested line. Quantity is capped by available stock at validation time;
/// that check lives in the request service, which reads the materials read
/// model before filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    pub line_no: u32,
    pub material_id: MaterialId,
    pub quantity: i64,
}

/// Aggregate root: MaterialRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRequest {
    id: RequestId,
    tenant_id: Option<TenantId>,
    project_id: Option<ProjectId>,
    budget_item_id: Option<BudgetItemId>,
    requester: String,
    request_type: RequestType,
    status: RequestStatus,
    lines: Vec<RequestLine>,
    requested_at: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl MaterialRequest {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            tenant_id: None,
            project_id: None,
            budget_item_id: None,
            requester: String::new(),
            request_type: RequestType::Consumption,
            status: RequestStatus::Requested,
            lines: Vec::new(),
            requested_at: None,
            dispatched_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RequestId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn budget_item_id(&self) -> Option<BudgetItemId> {
        self.budget_item_id
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn lines(&self) -> &[RequestLine] {
        &self.lines
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn dispatched_at(&self) -> Option<DateTime<Utc>> {
        self.dispatched_at
    }
}

impl AggregateRoot for MaterialRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: FileRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    pub tenant_id: TenantId,
    pub request_id: RequestId,
    pub project_id: ProjectId,
    pub budget_item_id: Option<BudgetItemId>,
    pub requester: String,
    pub request_type: RequestType,
    pub lines: Vec<RequestLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DispatchRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub tenant_id: TenantId,
    pub request_id: RequestId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCommand {
    FileRequest(FileRequest),
    DispatchRequest(DispatchRequest),
}

/// Event: RequestFiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFiled {
    pub tenant_id: TenantId,
    pub request_id: RequestId,
    pub project_id: ProjectId,
    pub budget_item_id: Option<BudgetItemId>,
    pub requester: String,
    pub request_type: RequestType,
    pub lines: Vec<RequestLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestDispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDispatched {
    pub tenant_id: TenantId,
    pub request_id: RequestId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    RequestFiled(RequestFiled),
    RequestDispatched(RequestDispatched),
}

impl Event for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::RequestFiled(_) => "requests.request.filed",
            RequestEvent::RequestDispatched(_) => "requests.request.dispatched",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequestEvent::RequestFiled(e) => e.occurred_at,
            RequestEvent::RequestDispatched(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MaterialRequest {
    type Command = RequestCommand;
    type Event = RequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequestEvent::RequestFiled(e) => {
                self.id = e.request_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.budget_item_id = e.budget_item_id;
                self.requester = e.requester.clone();
                self.request_type = e.request_type;
                self.status = RequestStatus::Requested;
                self.lines = e.lines.clone();
                self.requested_at = Some(e.occurred_at);
                self.created = true;
            }
            RequestEvent::RequestDispatched(e) => {
                self.status = RequestStatus::Dispatched;
                self.dispatched_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequestCommand::FileRequest(cmd) => self.handle_file(cmd),
            RequestCommand::DispatchRequest(cmd) => self.handle_dispatch(cmd),
        }
    }
}

impl MaterialRequest {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_request_id(&self, request_id: RequestId) -> Result<(), DomainError> {
        if self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        Ok(())
    }

    fn handle_file(&self, cmd: &FileRequest) -> Result<Vec<RequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("material request already exists"));
        }

        if cmd.requester.trim().is_empty() {
            return Err(DomainError::validation("requester cannot be empty"));
        }

        if cmd.request_type.requires_budget_item() && cmd.budget_item_id.is_none() {
            return Err(DomainError::validation(
                "a budget imputation is required for this request type",
            ));
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot file a request without lines",
            ));
        }
        for line in &cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(
                    "request line quantity must be positive",
                ));
            }
        }

        Ok(vec![RequestEvent::RequestFiled(RequestFiled {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            project_id: cmd.project_id,
            budget_item_id: cmd.budget_item_id,
            requester: cmd.requester.trim().to_string(),
            request_type: cmd.request_type,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_dispatch(&self, cmd: &DispatchRequest) -> Result<Vec<RequestEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_request_id(cmd.request_id)?;

        if self.status != RequestStatus::Requested {
            return Err(DomainError::conflict("request already dispatched"));
        }

        Ok(vec![RequestEvent::RequestDispatched(RequestDispatched {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
