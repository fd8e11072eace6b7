//! Material requests: budget items, filing, dispatch.
//!
//! Filing is gated against the live stock picture, with every failing
//! line reported in one pass. Budget overrun checks are advisory only:
//! they ride along as warnings and never block. Dispatch re-checks stock,
//! posts one issue movement per line and only then marks the request,
//! so a failing line leaves nothing half-issued.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use acopio_core::{AggregateId, DomainError, TenantId};
use acopio_materials::{Material, MaterialCommand, MaterialId, MovementKind, PostMovement};
use acopio_requests::{
    BudgetItem, BudgetItemCommand, BudgetItemId, DispatchRequest, FileRequest, MaterialRequest,
    ProjectId, RegisterBudgetItem, RequestCommand, RequestId, RequestLine, RequestStatus,
    RequestType,
};

use crate::command_dispatcher::DispatchError;
use crate::projections::{BudgetItemView, RequestView};
use crate::services::{Dispatcher, ProjectionSet};
use crate::settings::Settings;

/// A request as submitted by a site foreman.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSubmission {
    pub project_id: ProjectId,
    /// Required unless the request type waives it (EPP).
    pub budget_item_id: Option<BudgetItemId>,
    pub requester: String,
    pub request_type: RequestType,
    pub lines: Vec<RequestLineSubmission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLineSubmission {
    pub material_id: MaterialId,
    pub quantity: i64,
}

/// A filed request plus any advisory warnings raised during filing.
/// Warnings are for the caller's screen only; they are not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiledRequest {
    pub view: RequestView,
    pub warnings: Vec<String>,
}

pub struct RequestService {
    dispatcher: Arc<Dispatcher>,
    projections: Arc<ProjectionSet>,
    settings: Settings,
}

impl RequestService {
    pub fn new(dispatcher: Arc<Dispatcher>, projections: Arc<ProjectionSet>, settings: Settings) -> Self {
        Self {
            dispatcher,
            projections,
            settings,
        }
    }

    /// Register a budget item for a project. The (project, code) pair is
    /// unique per tenant.
    pub fn register_budget_item(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        code: &str,
        name: &str,
        theoretical_quantity: Option<i64>,
    ) -> Result<BudgetItemView, DispatchError> {
        let duplicate = self
            .projections
            .budget_items
            .list(tenant_id)
            .into_iter()
            .any(|view| {
                view.project_id == project_id && view.code.trim().eq_ignore_ascii_case(code.trim())
            });
        if duplicate {
            return Err(
                DomainError::conflict("budget item code already exists for this project").into(),
            );
        }

        let budget_item_id = BudgetItemId::new(AggregateId::new());
        let command = BudgetItemCommand::RegisterBudgetItem(RegisterBudgetItem {
            tenant_id,
            budget_item_id,
            project_id,
            code: code.to_string(),
            name: name.to_string(),
            theoretical_quantity,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatcher.dispatch::<BudgetItem>(
            tenant_id,
            budget_item_id.0,
            "requests.budget_item",
            command,
            |_, id| BudgetItem::empty(BudgetItemId::new(id)),
        )?;
        self.projections.apply_committed(&committed);

        self.projections
            .budget_items
            .get(tenant_id, &budget_item_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    /// File a material request.
    ///
    /// Hard gates (all lines checked, all failures reported together):
    /// every material must exist and every quantity must be positive and
    /// within available stock. The budget item, when given, must exist.
    /// Quantities above the efficient-usage share of the budget item's
    /// theoretical quantity only add warnings.
    pub fn file_request(
        &self,
        tenant_id: TenantId,
        submission: RequestSubmission,
    ) -> Result<FiledRequest, DispatchError> {
        let mut failures = Vec::new();

        let budget_view = match submission.budget_item_id {
            Some(id) => match self.projections.budget_items.get(tenant_id, &id) {
                Some(view) => Some(view),
                None => {
                    failures.push(format!("budget item {id} not found"));
                    None
                }
            },
            None => None,
        };

        if submission.lines.is_empty() {
            failures.push("request has no lines".to_string());
        }
        for (idx, line) in submission.lines.iter().enumerate() {
            let line_no = idx + 1;
            if line.quantity <= 0 {
                failures.push(format!("line {line_no}: quantity must be positive"));
                continue;
            }
            match self.projections.materials.get(tenant_id, &line.material_id) {
                None => failures.push(format!(
                    "line {line_no}: material {} not found",
                    line.material_id
                )),
                Some(view) if line.quantity > view.available_stock => failures.push(format!(
                    "line {line_no}: requested {} exceeds available stock {}",
                    line.quantity, view.available_stock
                )),
                Some(_) => {}
            }
        }
        if !failures.is_empty() {
            return Err(DomainError::validation(failures.join("; ")).into());
        }

        let warnings = self.overrun_warnings(&submission, budget_view.as_ref());

        let request_id = RequestId::new(AggregateId::new());
        let lines = submission
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| RequestLine {
                line_no: (idx + 1) as u32,
                material_id: line.material_id,
                quantity: line.quantity,
            })
            .collect();
        let command = RequestCommand::FileRequest(FileRequest {
            tenant_id,
            request_id,
            project_id: submission.project_id,
            budget_item_id: submission.budget_item_id,
            requester: submission.requester.clone(),
            request_type: submission.request_type,
            lines,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatcher.dispatch::<MaterialRequest>(
            tenant_id,
            request_id.0,
            "requests.request",
            command,
            |_, id| MaterialRequest::empty(RequestId::new(id)),
        )?;
        self.projections.apply_committed(&committed);

        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            request_id = %request_id,
            warnings = warnings.len(),
            "material request filed"
        );
        let view = self
            .projections
            .requests
            .get(tenant_id, &request_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))?;
        Ok(FiledRequest { view, warnings })
    }

    /// Dispatch a filed request: issue every line, then mark it.
    ///
    /// All lines are re-checked against available stock up front; an
    /// insufficient line aborts before any movement posts.
    pub fn dispatch_request(
        &self,
        tenant_id: TenantId,
        request_id: RequestId,
    ) -> Result<RequestView, DispatchError> {
        let view = self
            .projections
            .requests
            .get(tenant_id, &request_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))?;
        if view.status != RequestStatus::Requested {
            return Err(DomainError::conflict("request is already dispatched").into());
        }

        for line in &view.lines {
            let available = self
                .projections
                .materials
                .get(tenant_id, &line.material_id)
                .map(|m| m.available_stock)
                .unwrap_or(0);
            if line.quantity > available {
                return Err(DomainError::insufficient_stock(available, line.quantity).into());
            }
        }

        let kind = match view.request_type {
            RequestType::Asset => MovementKind::IssueAsset,
            RequestType::Consumption | RequestType::Epp => MovementKind::IssueConsumption,
        };
        let occurred_at = Utc::now();
        for line in &view.lines {
            let command = MaterialCommand::PostMovement(PostMovement {
                tenant_id,
                material_id: line.material_id,
                movement_id: Uuid::now_v7(),
                kind,
                quantity: line.quantity,
                origin: None,
                destination: None,
                reference: Some(request_id.to_string()),
                unit_cost: None,
                occurred_at,
            });
            let committed = self.dispatcher.dispatch::<Material>(
                tenant_id,
                line.material_id.0,
                "materials.material",
                command,
                |_, id| Material::empty(MaterialId::new(id)),
            )?;
            self.projections.apply_committed(&committed);
        }

        let command = RequestCommand::DispatchRequest(DispatchRequest {
            tenant_id,
            request_id,
            occurred_at,
        });
        let committed = self.dispatcher.dispatch::<MaterialRequest>(
            tenant_id,
            request_id.0,
            "requests.request",
            command,
            |_, id| MaterialRequest::empty(RequestId::new(id)),
        )?;
        self.projections.apply_committed(&committed);

        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            request_id = %request_id,
            lines = view.lines.len(),
            "material request dispatched"
        );
        self.projections
            .requests
            .get(tenant_id, &request_id)
            .ok_or(DispatchError::Domain(DomainError::NotFound))
    }

    fn overrun_warnings(
        &self,
        submission: &RequestSubmission,
        budget_view: Option<&BudgetItemView>,
    ) -> Vec<String> {
        let Some(budget) = budget_view else {
            return Vec::new();
        };
        let Some(theoretical) = budget.theoretical_quantity else {
            return Vec::new();
        };
        let percent = i64::from(self.settings.efficient_usage_percent);
        let threshold = theoretical.saturating_mul(percent) / 100;

        submission
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.quantity > threshold)
            .map(|(idx, line)| {
                format!(
                    "line {}: quantity {} exceeds {}% of theoretical quantity {} for budget item {}",
                    idx + 1,
                    line.quantity,
                    self.settings.efficient_usage_percent,
                    theoretical,
                    budget.code
                )
            })
            .collect()
    }
}
