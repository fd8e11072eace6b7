use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acopio_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use acopio_events::Event;
use acopio_materials::MaterialId;
use acopio_providers::ProviderId;

/// Purchase document identifier (tenant-scoped via `tenant_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub AggregateId);

impl DocumentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Lookup key for invoice numbers. The duplicate gate indexes documents by
/// `(provider tax key, invoice_number_key)`.
pub fn invoice_number_key(invoice_number: &str) -> String {
    invoice_number.trim().to_uppercase()
}

/// Reception conformance recorded per line at the warehouse door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineQualityStatus {
    Conforme,
    Observado,
    Rechazado,
}

/// Purchase document line. Quantities are in the material's unit; prices in
/// smallest currency unit (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_no: u32,
    pub material_id: MaterialId,
    /// Invoice text as received, before catalog resolution.
    pub raw_text: String,
    pub quantity_invoiced: i64,
    pub quantity_received: i64,
    pub unit_price: i64,
    pub quality_status: LineQualityStatus,
    pub remarks: Option<String>,
}

/// Aggregate root: PurchaseDocument.
///
/// Registration is the only lifecycle step: documents are immutable records
/// of a reception. Corrections are new documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseDocument {
    id: DocumentId,
    tenant_id: Option<TenantId>,
    provider_id: Option<ProviderId>,
    invoice_number: String,
    issue_date: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    purchase_order_ref: Option<String>,
    delivery_note_ref: Option<String>,
    vehicle_plate: Option<String>,
    support_document_ref: Option<String>,
    lines: Vec<DocumentLine>,
    total_net: i64,
    total_amount: i64,
    version: u64,
    created: bool,
}

impl PurchaseDocument {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DocumentId) -> Self {
        Self {
            id,
            tenant_id: None,
            provider_id: None,
            invoice_number: String::new(),
            issue_date: None,
            received_at: None,
            purchase_order_ref: None,
            delivery_note_ref: None,
            vehicle_plate: None,
            support_document_ref: None,
            lines: Vec::new(),
            total_net: 0,
            total_amount: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DocumentId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn provider_id(&self) -> Option<ProviderId> {
        self.provider_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn issue_date(&self) -> Option<DateTime<Utc>> {
        self.issue_date
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn support_document_ref(&self) -> Option<&str> {
        self.support_document_ref.as_deref()
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    /// Sum of line amounts before tax, in cents.
    pub fn total_net(&self) -> i64 {
        self.total_net
    }

    /// Payable amount in cents: the extracted total when one was trusted,
    /// otherwise net plus the tax surcharge.
    pub fn total_amount(&self) -> i64 {
        self.total_amount
    }
}

impl AggregateRoot for PurchaseDocument {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterDocument.
///
/// `extracted_total` is the total carried by an extracted invoice; when
/// absent the total is recomputed from the lines at `tax_rate_percent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDocument {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub provider_id: ProviderId,
    pub invoice_number: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub purchase_order_ref: Option<String>,
    pub delivery_note_ref: Option<String>,
    pub vehicle_plate: Option<String>,
    pub support_document_ref: Option<String>,
    pub lines: Vec<DocumentLine>,
    pub extracted_total: Option<i64>,
    pub tax_rate_percent: u16,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseDocumentCommand {
    RegisterDocument(RegisterDocument),
}

/// Event: DocumentRegistered.
///
/// `tax_rate_percent` is present only when the total was recomputed from the
/// lines; a trusted extracted total carries `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRegistered {
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub provider_id: ProviderId,
    pub invoice_number: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub purchase_order_ref: Option<String>,
    pub delivery_note_ref: Option<String>,
    pub vehicle_plate: Option<String>,
    pub support_document_ref: Option<String>,
    pub lines: Vec<DocumentLine>,
    pub total_net: i64,
    pub total_amount: i64,
    pub tax_rate_percent: Option<u16>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseDocumentEvent {
    DocumentRegistered(DocumentRegistered),
}

impl Event for PurchaseDocumentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseDocumentEvent::DocumentRegistered(_) => "procurement.document.registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseDocumentEvent::DocumentRegistered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseDocument {
    type Command = PurchaseDocumentCommand;
    type Event = PurchaseDocumentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseDocumentEvent::DocumentRegistered(e) => {
                self.id = e.document_id;
                self.tenant_id = Some(e.tenant_id);
                self.provider_id = Some(e.provider_id);
                self.invoice_number = e.invoice_number.clone();
                self.issue_date = e.issue_date;
                self.received_at = Some(e.received_at);
                self.purchase_order_ref = e.purchase_order_ref.clone();
                self.delivery_note_ref = e.delivery_note_ref.clone();
                self.vehicle_plate = e.vehicle_plate.clone();
                self.support_document_ref = e.support_document_ref.clone();
                self.lines = e.lines.clone();
                self.total_net = e.total_net;
                self.total_amount = e.total_amount;
                self.created = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseDocumentCommand::RegisterDocument(cmd) => self.handle_register(cmd),
        }
    }
}

impl PurchaseDocument {
    fn handle_register(
        &self,
        cmd: &RegisterDocument,
    ) -> Result<Vec<PurchaseDocumentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("document already exists"));
        }

        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot register a document without lines",
            ));
        }

        let mut total_net: i64 = 0;
        for line in &cmd.lines {
            if line.quantity_invoiced <= 0 {
                return Err(DomainError::validation(
                    "line invoiced quantity must be positive",
                ));
            }
            if line.quantity_received <= 0 {
                return Err(DomainError::validation(
                    "line received quantity must be positive",
                ));
            }
            if line.unit_price < 0 {
                return Err(DomainError::validation(
                    "line unit_price cannot be negative",
                ));
            }
            if line.quality_status != LineQualityStatus::Conforme
                && line.remarks.as_deref().map_or(true, |r| r.trim().is_empty())
            {
                return Err(DomainError::validation(
                    "remarks are required for non-conforming reception lines",
                ));
            }

            let line_total = (line.quantity_invoiced as i128)
                .checked_mul(line.unit_price as i128)
                .ok_or_else(|| DomainError::invariant("line amount overflow"))?;
            let running = (total_net as i128) + line_total;
            total_net = i64::try_from(running)
                .map_err(|_| DomainError::invariant("document total overflow"))?;
        }

        let (total_amount, tax_rate_percent) = match cmd.extracted_total {
            Some(total) => {
                if total < 0 {
                    return Err(DomainError::validation(
                        "extracted total cannot be negative",
                    ));
                }
                (total, None)
            }
            None => (
                apply_tax(total_net, cmd.tax_rate_percent)?,
                Some(cmd.tax_rate_percent),
            ),
        };

        Ok(vec![PurchaseDocumentEvent::DocumentRegistered(
            DocumentRegistered {
                tenant_id: cmd.tenant_id,
                document_id: cmd.document_id,
                provider_id: cmd.provider_id,
                invoice_number: cmd.invoice_number.trim().to_string(),
                issue_date: cmd.issue_date,
                received_at: cmd.received_at,
                purchase_order_ref: cmd.purchase_order_ref.clone(),
                delivery_note_ref: cmd.delivery_note_ref.clone(),
                vehicle_plate: cmd.vehicle_plate.clone(),
                support_document_ref: cmd.support_document_ref.clone(),
                lines: cmd.lines.clone(),
                total_net,
                total_amount,
                tax_rate_percent,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

/// Net plus surcharge at an integer percent rate, in cents. Truncates
/// toward zero on inexact division.
fn apply_tax(total_net: i64, rate_percent: u16) -> Result<i64, DomainError> {
    let gross = (total_net as i128) * (100 + rate_percent as i128) / 100;
    i64::try_from(gross).map_err(|_| DomainError::invariant("document total overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use acopio_core::AggregateId;
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_document_id() -> DocumentId {
        DocumentId::new(AggregateId::new())
    }

    fn test_provider_id() -> ProviderId {
        ProviderId::new(AggregateId::new())
    }

    fn test_material_id() -> MaterialId {
        MaterialId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn conforming_line(line_no: u32, quantity: i64, unit_price: i64) -> DocumentLine {
        DocumentLine {
            line_no,
            material_id: test_material_id(),
            raw_text: "CEMENTO GRIS TIPO I".to_string(),
            quantity_invoiced: quantity,
            quantity_received: quantity,
            unit_price,
            quality_status: LineQualityStatus::Conforme,
            remarks: None,
        }
    }

    fn register_cmd(lines: Vec<DocumentLine>, extracted_total: Option<i64>) -> RegisterDocument {
        RegisterDocument {
            tenant_id: test_tenant_id(),
            document_id: test_document_id(),
            provider_id: test_provider_id(),
            invoice_number: "F-001".to_string(),
            issue_date: Some(test_time()),
            received_at: test_time(),
            purchase_order_ref: None,
            delivery_note_ref: None,
            vehicle_plate: None,
            support_document_ref: None,
            lines,
            extracted_total,
            tax_rate_percent: 16,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn register_computes_net_and_taxed_totals() {
        let document = PurchaseDocument::empty(test_document_id());
        // 50 sacks at $6.00
        let cmd = register_cmd(vec![conforming_line(1, 50, 600)], None);

        let events = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd.clone()))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            PurchaseDocumentEvent::DocumentRegistered(e) => {
                assert_eq!(e.tenant_id, cmd.tenant_id);
                assert_eq!(e.document_id, cmd.document_id);
                assert_eq!(e.invoice_number, "F-001");
                assert_eq!(e.total_net, 30_000);
                assert_eq!(e.total_amount, 34_800);
                assert_eq!(e.tax_rate_percent, Some(16));
            }
        }
    }

    #[test]
    fn register_trusts_extracted_total_when_present() {
        let document = PurchaseDocument::empty(test_document_id());
        let cmd = register_cmd(vec![conforming_line(1, 50, 600)], Some(34_850));

        let events = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap();
        match &events[0] {
            PurchaseDocumentEvent::DocumentRegistered(e) => {
                assert_eq!(e.total_net, 30_000);
                assert_eq!(e.total_amount, 34_850);
                assert_eq!(e.tax_rate_percent, None);
            }
        }
    }

    #[test]
    fn register_rejects_empty_lines() {
        let document = PurchaseDocument::empty(test_document_id());
        let cmd = register_cmd(vec![], None);

        let err = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_rejects_blank_invoice_number() {
        let document = PurchaseDocument::empty(test_document_id());
        let mut cmd = register_cmd(vec![conforming_line(1, 10, 100)], None);
        cmd.invoice_number = "   ".to_string();

        let err = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_rejects_non_positive_quantity() {
        let document = PurchaseDocument::empty(test_document_id());
        let mut line = conforming_line(1, 10, 100);
        line.quantity_invoiced = 0;
        let cmd = register_cmd(vec![line], None);

        let err = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("invoiced quantity") => {}
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn register_rejects_negative_unit_price() {
        let document = PurchaseDocument::empty(test_document_id());
        let mut line = conforming_line(1, 10, 100);
        line.unit_price = -1;
        let cmd = register_cmd(vec![line], None);

        let err = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_conforming_line_requires_remarks() {
        let document = PurchaseDocument::empty(test_document_id());
        let mut line = conforming_line(1, 10, 100);
        line.quality_status = LineQualityStatus::Observado;
        line.remarks = Some("  ".to_string());
        let cmd = register_cmd(vec![line], None);

        let err = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("remarks") => {}
            other => panic!("Expected validation error about remarks, got {other:?}"),
        }
    }

    #[test]
    fn non_conforming_line_with_remarks_registers() {
        let document = PurchaseDocument::empty(test_document_id());
        let mut line = conforming_line(1, 10, 100);
        line.quality_status = LineQualityStatus::Rechazado;
        line.remarks = Some("torn sacks".to_string());
        let cmd = register_cmd(vec![line], None);

        let events = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn register_twice_is_a_conflict() {
        let mut document = PurchaseDocument::empty(test_document_id());
        let cmd = register_cmd(vec![conforming_line(1, 10, 100)], None);

        let events = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd.clone()))
            .unwrap();
        document.apply(&events[0]);
        assert_eq!(document.version(), 1);

        let err = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn apply_folds_header_lines_and_totals() {
        let cmd = register_cmd(
            vec![conforming_line(1, 50, 600), conforming_line(2, 10, 1_250)],
            None,
        );
        let mut document = PurchaseDocument::empty(cmd.document_id);

        let events = document
            .handle(&PurchaseDocumentCommand::RegisterDocument(cmd.clone()))
            .unwrap();
        document.apply(&events[0]);

        assert_eq!(document.invoice_number(), "F-001");
        assert_eq!(document.provider_id(), Some(cmd.provider_id));
        assert_eq!(document.lines().len(), 2);
        // 30_000 + 12_500 = 42_500; taxed at 16% = 49_300
        assert_eq!(document.total_net(), 42_500);
        assert_eq!(document.total_amount(), 49_300);
        assert_eq!(document.version(), 1);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let document = PurchaseDocument::empty(test_document_id());
        let snapshot = document.clone();
        let cmd = register_cmd(vec![conforming_line(1, 10, 100)], None);

        let _ = document.handle(&PurchaseDocumentCommand::RegisterDocument(cmd));
        assert_eq!(document, snapshot);
    }

    #[test]
    fn invoice_number_key_normalizes_case_and_whitespace() {
        assert_eq!(invoice_number_key("  f-001 "), "F-001");
        assert_eq!(invoice_number_key("F-001"), "F-001");
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn total_net_is_sum_of_line_amounts(
            quantities in proptest::collection::vec((1i64..1_000, 0i64..100_000), 1..8),
        ) {
            let lines: Vec<DocumentLine> = quantities
                .iter()
                .enumerate()
                .map(|(i, (qty, price))| {
                    let mut line = conforming_line(i as u32 + 1, *qty, *price);
                    line.quantity_received = *qty;
                    line
                })
                .collect();
            let expected: i64 = quantities.iter().map(|(qty, price)| qty * price).sum();

            let document = PurchaseDocument::empty(test_document_id());
            let events = document
                .handle(&PurchaseDocumentCommand::RegisterDocument(register_cmd(
                    lines, None,
                )))
                .unwrap();
            match &events[0] {
                PurchaseDocumentEvent::DocumentRegistered(e) => {
                    prop_assert_eq!(e.total_net, expected);
                    prop_assert!(e.total_amount >= e.total_net);
                }
            }
        }
    }
}
