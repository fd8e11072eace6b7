//! Purchase document intake pipeline.
//!
//! One submission runs validate, duplicate gate, then commit: resolve the
//! provider and every line's material, register the document, and stage
//! each received line into quarantine. Suspected duplicates are parked as
//! drafts under a pre-assigned document id until a reviewer confirms or
//! abandons them; nothing is written while a draft is parked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use acopio_core::{AggregateId, DomainError, TenantId};
use acopio_extraction::{DocumentStore, ExtractedInvoice, ExtractionError, InvoiceExtractor};
use acopio_materials::{Material, MaterialCommand, MaterialId, StageIntake};
use acopio_procurement::{
    DocumentId, DocumentLine, LineQualityStatus, PurchaseDocument, PurchaseDocumentCommand,
    PurchaseDocumentEvent, RegisterDocument,
};
use acopio_providers::ProviderId;
use acopio_quality::{OpenQuarantine, QuarantineCommand, QuarantineId, QuarantineRecord};

use crate::command_dispatcher::DispatchError;
use crate::event_store::StoredEvent;
use crate::services::identity::{IdentityResolver, MaterialResolution, Resolution};
use crate::services::{Dispatcher, ProjectionSet};
use crate::settings::Settings;

/// One intake submission, manual or extracted. Amounts are integer cents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSubmission {
    pub provider_name: String,
    pub provider_tax_id: String,
    pub invoice_number: String,
    pub issue_date: Option<DateTime<Utc>>,
    /// Defaults to the submission time when absent.
    pub received_at: Option<DateTime<Utc>>,
    pub purchase_order_ref: Option<String>,
    pub delivery_note_ref: Option<String>,
    pub vehicle_plate: Option<String>,
    /// Stored scan reference, when the draft came out of extraction.
    pub support_document_ref: Option<String>,
    /// Declared invoice total from the scan; carried as-is when present.
    pub extracted_total: Option<i64>,
    pub lines: Vec<SubmissionLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionLine {
    /// Invoice text as written; material resolution happens at commit.
    pub raw_text: String,
    pub quantity_invoiced: i64,
    /// Defaults to `quantity_invoiced` when the physical count was not
    /// taken separately.
    pub quantity_received: Option<i64>,
    pub unit_price: i64,
    pub quality_status: LineQualityStatus,
    pub remarks: Option<String>,
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Registered(IntakeReceipt),
    /// The draft was parked; nothing was written. `pending_id` becomes the
    /// document id if the reviewer confirms.
    Duplicate {
        pending_id: DocumentId,
        existing_document_id: DocumentId,
    },
}

/// What one committed intake produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeReceipt {
    pub document_id: DocumentId,
    pub provider: Resolution<ProviderId>,
    pub total_net: i64,
    pub total_amount: i64,
    pub lines: Vec<LineReceipt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReceipt {
    pub line_no: u32,
    pub material: MaterialResolution,
    pub quarantine_id: QuarantineId,
    pub quantity_received: i64,
}

pub struct IntakeService {
    dispatcher: Arc<Dispatcher>,
    projections: Arc<ProjectionSet>,
    identity: Arc<IdentityResolver>,
    settings: Settings,
    scans: Arc<dyn DocumentStore>,
    extractor: Arc<dyn InvoiceExtractor>,
    pending: Mutex<HashMap<(TenantId, DocumentId), DocumentSubmission>>,
}

impl IntakeService {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        projections: Arc<ProjectionSet>,
        identity: Arc<IdentityResolver>,
        settings: Settings,
        scans: Arc<dyn DocumentStore>,
        extractor: Arc<dyn InvoiceExtractor>,
    ) -> Self {
        Self {
            dispatcher,
            projections,
            identity,
            settings,
            scans,
            extractor,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a purchase document.
    ///
    /// With `acknowledge_duplicate` unset, a same-provider same-invoice
    /// match parks the draft and reports [`SubmitOutcome::Duplicate`];
    /// set, the gate is skipped and the document registers alongside the
    /// earlier one.
    pub fn submit_purchase(
        &self,
        tenant_id: TenantId,
        submission: DocumentSubmission,
        acknowledge_duplicate: bool,
    ) -> Result<SubmitOutcome, DispatchError> {
        validate_submission(&submission)?;

        if !acknowledge_duplicate {
            if let Some(existing) = self.find_registered_duplicate(tenant_id, &submission) {
                let pending_id = DocumentId::new(AggregateId::new());
                if let Ok(mut pending) = self.pending.lock() {
                    pending.insert((tenant_id, pending_id), submission);
                }
                tracing::info!(
                    tenant_id = %tenant_id.as_uuid(),
                    pending_id = %pending_id,
                    existing_document_id = %existing,
                    "suspected duplicate invoice parked for review"
                );
                return Ok(SubmitOutcome::Duplicate {
                    pending_id,
                    existing_document_id: existing,
                });
            }
        }

        let receipt = self.commit(tenant_id, submission, None)?;
        Ok(SubmitOutcome::Registered(receipt))
    }

    /// Confirm a parked draft: register it under its pre-assigned id.
    pub fn confirm_duplicate(
        &self,
        tenant_id: TenantId,
        pending_id: DocumentId,
    ) -> Result<IntakeReceipt, DispatchError> {
        let submission = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&(tenant_id, pending_id)))
            .ok_or(DispatchError::Domain(DomainError::NotFound))?;
        self.commit(tenant_id, submission, Some(pending_id))
    }

    /// Drop a parked draft without registering anything.
    pub fn discard_pending(&self, tenant_id: TenantId, pending_id: DocumentId) -> bool {
        self.pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&(tenant_id, pending_id)))
            .is_some()
    }

    /// Store a scan and run the extractor over it, returning an editable
    /// draft. Extraction failures surface as errors; the stored scan is kept
    /// for manual entry, and the draft only exists once the caller submits it.
    pub async fn extract_draft(
        &self,
        tenant_id: TenantId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(String, DocumentSubmission), ExtractionError> {
        let path = format!("{}/{}", tenant_id.as_uuid(), file_name);
        let document_url = self.scans.store(bytes, &path).await?;
        let invoice = self.extractor.extract(&document_url).await?;
        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            document_url = document_url.as_str(),
            lines = invoice.lines.len(),
            "invoice scan extracted into a draft"
        );
        let draft = draft_from_extraction(invoice, &document_url);
        Ok((document_url, draft))
    }

    /// Same-provider, same-normalized-invoice-number lookup against the
    /// registered documents. Read-only: an unknown provider cannot have a
    /// duplicate on file.
    fn find_registered_duplicate(
        &self,
        tenant_id: TenantId,
        submission: &DocumentSubmission,
    ) -> Option<DocumentId> {
        let provider = self
            .projections
            .providers
            .find_by_tax_id(tenant_id, &submission.provider_tax_id)
            .or_else(|| {
                self.projections
                    .providers
                    .find_by_name(tenant_id, &submission.provider_name)
            })?;
        self.projections
            .documents
            .find_by_invoice(tenant_id, provider.provider_id, &submission.invoice_number)
            .map(|view| view.document_id)
    }

    fn commit(
        &self,
        tenant_id: TenantId,
        submission: DocumentSubmission,
        preassigned: Option<DocumentId>,
    ) -> Result<IntakeReceipt, DispatchError> {
        let occurred_at = Utc::now();
        let received_at = submission.received_at.unwrap_or(occurred_at);

        let provider = self.identity.resolve_provider(
            tenant_id,
            &submission.provider_name,
            &submission.provider_tax_id,
            occurred_at,
        )?;

        let mut lines = Vec::with_capacity(submission.lines.len());
        let mut resolutions = Vec::with_capacity(submission.lines.len());
        for (idx, line) in submission.lines.iter().enumerate() {
            let resolution = self
                .identity
                .resolve_material(tenant_id, &line.raw_text, occurred_at)?;
            lines.push(DocumentLine {
                line_no: (idx + 1) as u32,
                material_id: resolution.material_id(),
                raw_text: line.raw_text.clone(),
                quantity_invoiced: line.quantity_invoiced,
                quantity_received: line.quantity_received.unwrap_or(line.quantity_invoiced),
                unit_price: line.unit_price,
                quality_status: line.quality_status,
                remarks: line.remarks.clone(),
            });
            resolutions.push(resolution);
        }

        let document_id = preassigned.unwrap_or_else(|| DocumentId::new(AggregateId::new()));
        let command = PurchaseDocumentCommand::RegisterDocument(RegisterDocument {
            tenant_id,
            document_id,
            provider_id: provider.id(),
            invoice_number: submission.invoice_number.clone(),
            issue_date: submission.issue_date,
            received_at,
            purchase_order_ref: submission.purchase_order_ref.clone(),
            delivery_note_ref: submission.delivery_note_ref.clone(),
            vehicle_plate: submission.vehicle_plate.clone(),
            support_document_ref: submission.support_document_ref.clone(),
            lines: lines.clone(),
            extracted_total: submission.extracted_total,
            tax_rate_percent: self.settings.tax_rate_percent,
            occurred_at,
        });
        let committed = self.dispatcher.dispatch::<PurchaseDocument>(
            tenant_id,
            document_id.0,
            "procurement.document",
            command,
            |_, id| PurchaseDocument::empty(DocumentId::new(id)),
        )?;
        self.projections.apply_committed(&committed);
        let (total_net, total_amount) = registered_totals(&committed)?;

        let mut line_receipts = Vec::with_capacity(lines.len());
        for (line, resolution) in lines.iter().zip(resolutions) {
            self.stage_line(tenant_id, &submission.invoice_number, line, occurred_at)?;
            let quarantine_id = self.open_quarantine(tenant_id, document_id, line, occurred_at)?;
            line_receipts.push(LineReceipt {
                line_no: line.line_no,
                material: resolution,
                quarantine_id,
                quantity_received: line.quantity_received,
            });
        }

        tracing::info!(
            tenant_id = %tenant_id.as_uuid(),
            document_id = %document_id,
            invoice_number = submission.invoice_number.as_str(),
            lines = line_receipts.len(),
            total_amount,
            "purchase document registered and staged into quarantine"
        );
        Ok(IntakeReceipt {
            document_id,
            provider,
            total_net,
            total_amount,
            lines: line_receipts,
        })
    }

    fn stage_line(
        &self,
        tenant_id: TenantId,
        invoice_number: &str,
        line: &DocumentLine,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let command = MaterialCommand::StageIntake(StageIntake {
            tenant_id,
            material_id: line.material_id,
            quantity: line.quantity_received,
            reference: invoice_number.to_string(),
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
        Ok(())
    }

    fn open_quarantine(
        &self,
        tenant_id: TenantId,
        document_id: DocumentId,
        line: &DocumentLine,
        occurred_at: DateTime<Utc>,
    ) -> Result<QuarantineId, DispatchError> {
        // Snapshot the certificate requirement from the catalog as of now;
        // later catalog edits must not change an open record's gate.
        let requires_certificate = self
            .projections
            .materials
            .get(tenant_id, &line.material_id)
            .map(|view| view.requires_certificate)
            .unwrap_or(false);

        let quarantine_id = QuarantineId::new(AggregateId::new());
        let command = QuarantineCommand::OpenQuarantine(OpenQuarantine {
            tenant_id,
            quarantine_id,
            material_id: line.material_id,
            document_id,
            line_no: line.line_no,
            physical_count: line.quantity_received,
            requires_certificate,
            unit_cost: Some(line.unit_price),
            certificate_ref: None,
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
        Ok(quarantine_id)
    }
}

fn validate_submission(submission: &DocumentSubmission) -> Result<(), DomainError> {
    if submission.provider_name.trim().is_empty() {
        return Err(DomainError::validation("provider name is required"));
    }
    if submission.provider_tax_id.trim().is_empty() {
        return Err(DomainError::validation("provider tax id is required"));
    }
    if submission.invoice_number.trim().is_empty() {
        return Err(DomainError::validation("invoice number is required"));
    }
    if submission.lines.is_empty() {
        return Err(DomainError::validation("document has no lines"));
    }
    for (idx, line) in submission.lines.iter().enumerate() {
        let line_no = idx + 1;
        if line.raw_text.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "line {line_no}: material text is required"
            )));
        }
        if line.quantity_invoiced <= 0 {
            return Err(DomainError::validation(format!(
                "line {line_no}: quantity invoiced must be positive"
            )));
        }
        if let Some(received) = line.quantity_received {
            if received <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity received must be positive"
                )));
            }
        }
        if line.unit_price < 0 {
            return Err(DomainError::validation(format!(
                "line {line_no}: unit price cannot be negative"
            )));
        }
        let needs_remarks = line.quality_status != LineQualityStatus::Conforme
            && line.remarks.as_deref().map(str::trim).unwrap_or("").is_empty();
        if needs_remarks {
            return Err(DomainError::MissingRemarks);
        }
    }
    Ok(())
}

/// Pull the computed totals off the registration event just committed.
fn registered_totals(committed: &[StoredEvent]) -> Result<(i64, i64), DispatchError> {
    let stored = committed
        .first()
        .ok_or_else(|| DispatchError::Deserialize("registration produced no event".to_string()))?;
    let event: PurchaseDocumentEvent = serde_json::from_value(stored.payload.clone())
        .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
    let PurchaseDocumentEvent::DocumentRegistered(e) = event;
    Ok((e.total_net, e.total_amount))
}

fn draft_from_extraction(invoice: ExtractedInvoice, document_url: &str) -> DocumentSubmission {
    DocumentSubmission {
        provider_name: invoice.provider_name,
        provider_tax_id: invoice.provider_tax_id,
        invoice_number: invoice.invoice_number,
        issue_date: invoice.issue_date,
        received_at: None,
        purchase_order_ref: invoice.purchase_order_ref,
        delivery_note_ref: invoice.delivery_note_ref,
        vehicle_plate: invoice.vehicle_plate,
        support_document_ref: Some(document_url.to_string()),
        extracted_total: invoice.total_amount,
        lines: invoice
            .lines
            .into_iter()
            .map(|line| SubmissionLine {
                raw_text: line.name,
                quantity_invoiced: line.quantity,
                quantity_received: None,
                unit_price: line.unit_price,
                quality_status: LineQualityStatus::Conforme,
                remarks: None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(raw_text: &str) -> SubmissionLine {
        SubmissionLine {
            raw_text: raw_text.to_string(),
            quantity_invoiced: 10,
            quantity_received: None,
            unit_price: 100,
            quality_status: LineQualityStatus::Conforme,
            remarks: None,
        }
    }

    fn submission() -> DocumentSubmission {
        DocumentSubmission {
            provider_name: "ACME, C.A.".to_string(),
            provider_tax_id: "J-12345678-9".to_string(),
            invoice_number: "F-001".to_string(),
            issue_date: None,
            received_at: None,
            purchase_order_ref: None,
            delivery_note_ref: None,
            vehicle_plate: None,
            support_document_ref: None,
            extracted_total: None,
            lines: vec![line("cemento gris tipo i")],
        }
    }

    #[test]
    fn submission_without_lines_is_invalid() {
        let mut s = submission();
        s.lines.clear();
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(err, DomainError::validation("document has no lines"));
    }

    #[test]
    fn non_conforme_line_requires_remarks() {
        let mut s = submission();
        s.lines[0].quality_status = LineQualityStatus::Observado;
        assert_eq!(validate_submission(&s).unwrap_err(), DomainError::MissingRemarks);

        s.lines[0].remarks = Some("two sacks torn".to_string());
        assert!(validate_submission(&s).is_ok());
    }

    #[test]
    fn zero_quantity_is_rejected_with_the_line_number() {
        let mut s = submission();
        s.lines.push(line("arena lavada"));
        s.lines[1].quantity_invoiced = 0;
        let err = validate_submission(&s).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("line 2: quantity invoiced must be positive")
        );
    }

    #[test]
    fn extracted_draft_maps_lines_and_keeps_the_scan_reference() {
        let invoice = ExtractedInvoice {
            provider_name: "ACME, C.A.".to_string(),
            provider_tax_id: "J-12345678-9".to_string(),
            invoice_number: "F-001".to_string(),
            issue_date: None,
            total_amount: Some(34800),
            lines: vec![acopio_extraction::ExtractedLine {
                name: "cemento gris tipo i".to_string(),
                quantity: 50,
                unit_price: 600,
            }],
            purchase_order_ref: None,
            delivery_note_ref: None,
            vehicle_plate: None,
        };

        let draft = draft_from_extraction(invoice, "mem://t/f-001.jpg");
        assert_eq!(draft.support_document_ref.as_deref(), Some("mem://t/f-001.jpg"));
        assert_eq!(draft.extracted_total, Some(34800));
        assert_eq!(draft.lines.len(), 1);
        assert_eq!(draft.lines[0].raw_text, "cemento gris tipo i");
        assert_eq!(draft.lines[0].quantity_invoiced, 50);
        assert_eq!(draft.lines[0].quality_status, LineQualityStatus::Conforme);
    }
}
