use chrono::{DateTime, Utc};
use serde::Deserialize;

use acopio_infra::projections::{
    BudgetItemView, DocumentView, KardexEntry, MaterialStockView, ProviderView,
    QuarantineRecordView, RequestView,
};
use acopio_infra::services::{
    DocumentSubmission, FiledRequest, IntakeReceipt, SubmissionLine, SubmitOutcome,
};
use acopio_procurement::LineQualityStatus;
use acopio_quality::DecisionKind;
use acopio_requests::RequestType;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitDocumentRequest {
    pub provider_name: String,
    pub provider_tax_id: String,
    pub invoice_number: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub purchase_order_ref: Option<String>,
    pub delivery_note_ref: Option<String>,
    pub vehicle_plate: Option<String>,
    pub support_document_ref: Option<String>,
    pub extracted_total: Option<i64>,
    pub lines: Vec<SubmitLineRequest>,
    /// Set after the reviewer saw the duplicate warning and insists.
    #[serde(default)]
    pub acknowledge_duplicate: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubmitLineRequest {
    pub raw_text: String,
    pub quantity_invoiced: i64,
    pub quantity_received: Option<i64>,
    pub unit_price: i64,
    /// Defaults to CONFORME when the receiver noted nothing.
    pub quality_status: Option<LineQualityStatus>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub kind: DecisionKind,
    pub aisle: Option<String>,
    pub shelf: Option<String>,
    pub level: Option<String>,
    pub remarks: Option<String>,
    pub certificate_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostMovementRequest {
    pub material_id: String,
    pub kind: acopio_materials::MovementKind,
    pub quantity: i64,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub reference: Option<String>,
    pub unit_cost: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub material_id: String,
    pub quantity: i64,
    pub origin: String,
    pub destination: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileRequestRequest {
    pub project_id: String,
    pub budget_item_id: Option<String>,
    pub requester: String,
    pub request_type: RequestType,
    pub lines: Vec<RequestLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RequestLineRequest {
    pub material_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterProviderRequest {
    pub name: String,
    pub tax_id: String,
    pub contact: Option<acopio_providers::ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterMaterialRequest {
    pub name: String,
    pub unit: String,
    pub category: String,
    #[serde(default)]
    pub requires_certificate: bool,
}

#[derive(Debug, Deserialize)]
pub struct OverrideMappingRequest {
    pub raw_text: String,
    pub material_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBudgetItemRequest {
    pub project_id: String,
    pub code: String,
    pub name: String,
    pub theoretical_quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractionParams {
    pub file_name: String,
}

impl SubmitDocumentRequest {
    /// Split into the service-level submission and the duplicate flag.
    pub fn into_submission(self) -> (DocumentSubmission, bool) {
        let acknowledge = self.acknowledge_duplicate;
        let submission = DocumentSubmission {
            provider_name: self.provider_name,
            provider_tax_id: self.provider_tax_id,
            invoice_number: self.invoice_number,
            issue_date: self.issue_date,
            received_at: self.received_at,
            purchase_order_ref: self.purchase_order_ref,
            delivery_note_ref: self.delivery_note_ref,
            vehicle_plate: self.vehicle_plate,
            support_document_ref: self.support_document_ref,
            extracted_total: self.extracted_total,
            lines: self
                .lines
                .into_iter()
                .map(|l| SubmissionLine {
                    raw_text: l.raw_text,
                    quantity_invoiced: l.quantity_invoiced,
                    quantity_received: l.quantity_received,
                    unit_price: l.unit_price,
                    quality_status: l.quality_status.unwrap_or(LineQualityStatus::Conforme),
                    remarks: l.remarks,
                })
                .collect(),
        };
        (submission, acknowledge)
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn provider_to_json(rm: ProviderView) -> serde_json::Value {
    serde_json::json!({
        "id": rm.provider_id.to_string(),
        "name": rm.name,
        "tax_id": rm.tax_id,
        "contact": {
            "email": rm.contact.email,
            "phone": rm.contact.phone,
            "address": rm.contact.address,
        },
        "registered_at": rm.registered_at.to_rfc3339(),
    })
}

pub fn material_to_json(rm: MaterialStockView) -> serde_json::Value {
    serde_json::json!({
        "id": rm.material_id.to_string(),
        "name": rm.name,
        "unit": rm.unit,
        "category": rm.category,
        "requires_certificate": rm.requires_certificate,
        "available_stock": rm.available_stock,
        "in_quarantine": rm.in_quarantine,
        "average_unit_cost": rm.average_unit_cost,
        "placement": rm.placement,
    })
}

pub fn kardex_to_json(entry: KardexEntry) -> serde_json::Value {
    serde_json::json!({
        "movement_id": entry.movement_id.to_string(),
        "sequence": entry.sequence,
        "kind": entry.kind,
        "code": entry.code,
        "quantity": entry.quantity,
        "quantity_delta": entry.quantity_delta,
        "balance_after": entry.balance_after,
        "origin": entry.origin,
        "destination": entry.destination,
        "reference": entry.reference,
        "unit_cost": entry.unit_cost,
        "occurred_at": entry.occurred_at.to_rfc3339(),
    })
}

pub fn document_to_json(rm: DocumentView) -> serde_json::Value {
    serde_json::json!({
        "id": rm.document_id.to_string(),
        "provider_id": rm.provider_id.to_string(),
        "invoice_number": rm.invoice_number,
        "issue_date": rm.issue_date.map(|d| d.to_rfc3339()),
        "received_at": rm.received_at.to_rfc3339(),
        "purchase_order_ref": rm.purchase_order_ref,
        "delivery_note_ref": rm.delivery_note_ref,
        "vehicle_plate": rm.vehicle_plate,
        "support_document_ref": rm.support_document_ref,
        "total_net": rm.total_net,
        "total_amount": rm.total_amount,
        "tax_rate_percent": rm.tax_rate_percent,
        "registered_at": rm.registered_at.to_rfc3339(),
        "lines": rm.lines.into_iter().map(|l| serde_json::json!({
            "line_no": l.line_no,
            "material_id": l.material_id.to_string(),
            "raw_text": l.raw_text,
            "quantity_invoiced": l.quantity_invoiced,
            "quantity_received": l.quantity_received,
            "unit_price": l.unit_price,
            "quality_status": l.quality_status,
            "remarks": l.remarks,
        })).collect::<Vec<_>>()
    })
}

pub fn quarantine_to_json(rm: QuarantineRecordView) -> serde_json::Value {
    serde_json::json!({
        "id": rm.quarantine_id.to_string(),
        "material_id": rm.material_id.to_string(),
        "document_id": rm.document_id.to_string(),
        "line_no": rm.line_no,
        "physical_count": rm.physical_count,
        "requires_certificate": rm.requires_certificate,
        "unit_cost": rm.unit_cost,
        "certificate_ref": rm.certificate_ref,
        "status": rm.status,
        "location_label": rm.location_label,
        "remarks": rm.remarks,
        "opened_at": rm.opened_at.to_rfc3339(),
        "decided_at": rm.decided_at.map(|d| d.to_rfc3339()),
    })
}

pub fn request_to_json(rm: RequestView) -> serde_json::Value {
    serde_json::json!({
        "id": rm.request_id.to_string(),
        "project_id": rm.project_id.to_string(),
        "budget_item_id": rm.budget_item_id.map(|id| id.to_string()),
        "requester": rm.requester,
        "request_type": rm.request_type,
        "status": rm.status,
        "filed_at": rm.filed_at.to_rfc3339(),
        "dispatched_at": rm.dispatched_at.map(|d| d.to_rfc3339()),
        "lines": rm.lines.into_iter().map(|l| serde_json::json!({
            "line_no": l.line_no,
            "material_id": l.material_id.to_string(),
            "quantity": l.quantity,
        })).collect::<Vec<_>>()
    })
}

pub fn budget_item_to_json(rm: BudgetItemView) -> serde_json::Value {
    serde_json::json!({
        "id": rm.budget_item_id.to_string(),
        "project_id": rm.project_id.to_string(),
        "code": rm.code,
        "name": rm.name,
        "theoretical_quantity": rm.theoretical_quantity,
        "registered_at": rm.registered_at.to_rfc3339(),
    })
}

pub fn receipt_to_json(receipt: IntakeReceipt) -> serde_json::Value {
    serde_json::json!({
        "document_id": receipt.document_id.to_string(),
        "provider": {
            "id": receipt.provider.id().to_string(),
            "created": receipt.provider.was_created(),
        },
        "total_net": receipt.total_net,
        "total_amount": receipt.total_amount,
        "lines": receipt.lines.into_iter().map(|l| serde_json::json!({
            "line_no": l.line_no,
            "material_id": l.material.material_id().to_string(),
            "material_created": l.material.resolution.was_created(),
            "from_mapping": l.material.from_mapping,
            "quarantine_id": l.quarantine_id.to_string(),
            "quantity_received": l.quantity_received,
        })).collect::<Vec<_>>()
    })
}

pub fn submit_outcome_to_json(outcome: SubmitOutcome) -> (bool, serde_json::Value) {
    match outcome {
        SubmitOutcome::Registered(receipt) => (
            false,
            serde_json::json!({
                "outcome": "REGISTERED",
                "receipt": receipt_to_json(receipt),
            }),
        ),
        SubmitOutcome::Duplicate {
            pending_id,
            existing_document_id,
        } => (
            true,
            serde_json::json!({
                "outcome": "DUPLICATE",
                "pending_id": pending_id.to_string(),
                "existing_document_id": existing_document_id.to_string(),
            }),
        ),
    }
}

/// Extracted draft, shaped like [`SubmitDocumentRequest`] so the client can
/// edit it and POST it straight back.
pub fn draft_to_json(draft: DocumentSubmission) -> serde_json::Value {
    serde_json::json!({
        "provider_name": draft.provider_name,
        "provider_tax_id": draft.provider_tax_id,
        "invoice_number": draft.invoice_number,
        "issue_date": draft.issue_date.map(|d| d.to_rfc3339()),
        "received_at": draft.received_at.map(|d| d.to_rfc3339()),
        "purchase_order_ref": draft.purchase_order_ref,
        "delivery_note_ref": draft.delivery_note_ref,
        "vehicle_plate": draft.vehicle_plate,
        "support_document_ref": draft.support_document_ref,
        "extracted_total": draft.extracted_total,
        "lines": draft.lines.into_iter().map(|l| serde_json::json!({
            "raw_text": l.raw_text,
            "quantity_invoiced": l.quantity_invoiced,
            "quantity_received": l.quantity_received,
            "unit_price": l.unit_price,
            "quality_status": l.quality_status,
            "remarks": l.remarks,
        })).collect::<Vec<_>>()
    })
}

pub fn filed_request_to_json(filed: FiledRequest) -> serde_json::Value {
    let FiledRequest { view, warnings } = filed;
    serde_json::json!({
        "request": request_to_json(view),
        "warnings": warnings,
    })
}
