use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acopio_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use acopio_events::Event;
use acopio_materials::MaterialId;
use acopio_procurement::DocumentId;

/// Quarantine record identifier (tenant-scoped via `tenant_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuarantineId(pub AggregateId);

impl QuarantineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for QuarantineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Quarantine record lifecycle. One transition out of `Pending`, ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuarantineStatus {
    Pending,
    ReleasedGood,
    ReleasedWithObservations,
    Returned,
}

/// Inspector verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Good,
    Details,
    Rejected,
}

/// Release quality grade carried by the released event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseGrade {
    Good,
    WithObservations,
}

impl ReleaseGrade {
    pub fn status(self) -> QuarantineStatus {
        match self {
            ReleaseGrade::Good => QuarantineStatus::ReleasedGood,
            ReleaseGrade::WithObservations => QuarantineStatus::ReleasedWithObservations,
        }
    }
}

/// Aggregate root: QuarantineRecord.
///
/// Snapshots the material facts that gate the decision (certificate
/// requirement, unit cost) at open time, so the decision does not depend on
/// later catalog edits. Pending stock is off-ledger: the count here never
/// touches `available_stock` until release posts a movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineRecord {
    id: QuarantineId,
    tenant_id: Option<TenantId>,
    material_id: Option<MaterialId>,
    document_id: Option<DocumentId>,
    line_no: u32,
    physical_count: i64,
    requires_certificate: bool,
    unit_cost: Option<i64>,
    certificate_ref: Option<String>,
    status: QuarantineStatus,
    remarks: Option<String>,
    location_label: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl QuarantineRecord {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: QuarantineId) -> Self {
        Self {
            id,
            tenant_id: None,
            material_id: None,
            document_id: None,
            line_no: 0,
            physical_count: 0,
            requires_certificate: false,
            unit_cost: None,
            certificate_ref: None,
            status: QuarantineStatus::Pending,
            remarks: None,
            location_label: None,
            decided_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QuarantineId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn material_id(&self) -> Option<MaterialId> {
        self.material_id
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document_id
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn physical_count(&self) -> i64 {
        self.physical_count
    }

    pub fn requires_certificate(&self) -> bool {
        self.requires_certificate
    }

    pub fn unit_cost(&self) -> Option<i64> {
        self.unit_cost
    }

    pub fn certificate_ref(&self) -> Option<&str> {
        self.certificate_ref.as_deref()
    }

    pub fn status(&self) -> QuarantineStatus {
        self.status
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn location_label(&self) -> Option<&str> {
        self.location_label.as_deref()
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == QuarantineStatus::Pending
    }
}

impl AggregateRoot for QuarantineRecord {
    type Id = QuarantineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenQuarantine. One record per received document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQuarantine {
    pub tenant_id: TenantId,
    pub quarantine_id: QuarantineId,
    pub material_id: MaterialId,
    pub document_id: DocumentId,
    pub line_no: u32,
    pub physical_count: i64,
    pub requires_certificate: bool,
    pub unit_cost: Option<i64>,
    pub certificate_ref: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Decide.
///
/// `general_area` is the fallback placement tag used when no storage
/// location is supplied; the caller injects it from runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decide {
    pub tenant_id: TenantId,
    pub quarantine_id: QuarantineId,
    pub kind: DecisionKind,
    pub aisle: Option<String>,
    pub shelf: Option<String>,
    pub level: Option<String>,
    pub remarks: Option<String>,
    pub certificate_ref: Option<String>,
    pub general_area: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarantineCommand {
    OpenQuarantine(OpenQuarantine),
    Decide(Decide),
}

/// Event: QuarantineOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineOpened {
    pub tenant_id: TenantId,
    pub quarantine_id: QuarantineId,
    pub material_id: MaterialId,
    pub document_id: DocumentId,
    pub line_no: u32,
    pub physical_count: i64,
    pub requires_certificate: bool,
    pub unit_cost: Option<i64>,
    pub certificate_ref: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuarantineReleased.
///
/// Carries the material snapshot the quality service needs to post the
/// purchase-in movement without re-reading the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineReleased {
    pub tenant_id: TenantId,
    pub quarantine_id: QuarantineId,
    pub material_id: MaterialId,
    pub grade: ReleaseGrade,
    pub physical_count: i64,
    pub unit_cost: Option<i64>,
    pub location_label: String,
    pub remarks: Option<String>,
    pub certificate_ref: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuarantineReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineReturned {
    pub tenant_id: TenantId,
    pub quarantine_id: QuarantineId,
    pub material_id: MaterialId,
    pub physical_count: i64,
    pub remarks: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarantineEvent {
    QuarantineOpened(QuarantineOpened),
    QuarantineReleased(QuarantineReleased),
    QuarantineReturned(QuarantineReturned),
}

impl Event for QuarantineEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QuarantineEvent::QuarantineOpened(_) => "quality.quarantine.opened",
            QuarantineEvent::QuarantineReleased(_) => "quality.quarantine.released",
            QuarantineEvent::QuarantineReturned(_) => "quality.quarantine.returned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QuarantineEvent::QuarantineOpened(e) => e.occurred_at,
            QuarantineEvent::QuarantineReleased(e) => e.occurred_at,
            QuarantineEvent::QuarantineReturned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for QuarantineRecord {
    type Command = QuarantineCommand;
    type Event = QuarantineEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QuarantineEvent::QuarantineOpened(e) => {
                self.id = e.quarantine_id;
                self.tenant_id = Some(e.tenant_id);
                self.material_id = Some(e.material_id);
                self.document_id = Some(e.document_id);
                self.line_no = e.line_no;
                self.physical_count = e.physical_count;
                self.requires_certificate = e.requires_certificate;
                self.unit_cost = e.unit_cost;
                self.certificate_ref = e.certificate_ref.clone();
                self.status = QuarantineStatus::Pending;
                self.created = true;
            }
            QuarantineEvent::QuarantineReleased(e) => {
                self.status = e.grade.status();
                self.location_label = Some(e.location_label.clone());
                self.remarks = e.remarks.clone();
                self.certificate_ref = e.certificate_ref.clone();
                self.decided_at = Some(e.occurred_at);
            }
            QuarantineEvent::QuarantineReturned(e) => {
                self.status = QuarantineStatus::Returned;
                self.remarks = Some(e.remarks.clone());
                self.decided_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QuarantineCommand::OpenQuarantine(cmd) => self.handle_open(cmd),
            QuarantineCommand::Decide(cmd) => self.handle_decide(cmd),
        }
    }
}

impl QuarantineRecord {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_quarantine_id(&self, quarantine_id: QuarantineId) -> Result<(), DomainError> {
        if self.id != quarantine_id {
            return Err(DomainError::invariant("quarantine_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenQuarantine) -> Result<Vec<QuarantineEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("quarantine record already exists"));
        }

        if cmd.physical_count <= 0 {
            return Err(DomainError::validation(
                "quarantine physical count must be positive",
            ));
        }

        Ok(vec![QuarantineEvent::QuarantineOpened(QuarantineOpened {
            tenant_id: cmd.tenant_id,
            quarantine_id: cmd.quarantine_id,
            material_id: cmd.material_id,
            document_id: cmd.document_id,
            line_no: cmd.line_no,
            physical_count: cmd.physical_count,
            requires_certificate: cmd.requires_certificate,
            unit_cost: cmd.unit_cost,
            certificate_ref: cmd.certificate_ref.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decide(&self, cmd: &Decide) -> Result<Vec<QuarantineEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_quarantine_id(cmd.quarantine_id)?;

        if self.status != QuarantineStatus::Pending {
            return Err(DomainError::AlreadyResolved);
        }

        let material_id = self
            .material_id
            .ok_or_else(|| DomainError::invariant("quarantine record has no material"))?;
        let remarks = normalized(cmd.remarks.as_deref());

        match cmd.kind {
            DecisionKind::Rejected => {
                // Rejection ignores storage and certificate fields entirely.
                let Some(remarks) = remarks else {
                    return Err(DomainError::MissingRemarks);
                };

                Ok(vec![QuarantineEvent::QuarantineReturned(
                    QuarantineReturned {
                        tenant_id: cmd.tenant_id,
                        quarantine_id: cmd.quarantine_id,
                        material_id,
                        physical_count: self.physical_count,
                        remarks,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            DecisionKind::Good | DecisionKind::Details => {
                if cmd.kind == DecisionKind::Details && remarks.is_none() {
                    return Err(DomainError::MissingRemarks);
                }

                let location_label = compose_location(
                    cmd.aisle.as_deref(),
                    cmd.shelf.as_deref(),
                    cmd.level.as_deref(),
                    &cmd.general_area,
                )?;

                // Decision certificate wins, else the intake-attached one.
                let certificate_ref = normalized(cmd.certificate_ref.as_deref())
                    .or_else(|| self.certificate_ref.clone());
                if self.requires_certificate && certificate_ref.is_none() {
                    return Err(DomainError::MissingCertificate);
                }

                let grade = match cmd.kind {
                    DecisionKind::Good => ReleaseGrade::Good,
                    _ => ReleaseGrade::WithObservations,
                };

                Ok(vec![QuarantineEvent::QuarantineReleased(
                    QuarantineReleased {
                        tenant_id: cmd.tenant_id,
                        quarantine_id: cmd.quarantine_id,
                        material_id,
                        grade,
                        physical_count: self.physical_count,
                        unit_cost: self.unit_cost,
                        location_label,
                        remarks,
                        certificate_ref,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
        }
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Storage placement rule: all of aisle/shelf/level, or none (falling back
/// to the general area tag). A strict subset is an error.
fn compose_location(
    aisle: Option<&str>,
    shelf: Option<&str>,
    level: Option<&str>,
    general_area: &str,
) -> Result<String, DomainError> {
    let aisle = normalized(aisle);
    let shelf = normalized(shelf);
    let level = normalized(level);

    match (aisle, shelf, level) {
        (Some(a), Some(s), Some(l)) => Ok(format!("AISLE {a} | SHELF {s} | LEVEL {l}")),
        (None, None, None) => Ok(general_area.to_string()),
        _ => Err(DomainError::IncompleteLocation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acopio_core::AggregateId;
    use proptest::prelude::*;

    const GENERAL_AREA: &str = "GENERAL STORAGE";

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_quarantine_id() -> QuarantineId {
        QuarantineId::new(AggregateId::new())
    }

    fn test_material_id() -> MaterialId {
        MaterialId::new(AggregateId::new())
    }

    fn test_document_id() -> DocumentId {
        DocumentId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn opened_record(
        tenant_id: TenantId,
        physical_count: i64,
        requires_certificate: bool,
        certificate_ref: Option<&str>,
    ) -> QuarantineRecord {
        let quarantine_id = test_quarantine_id();
        let mut record = QuarantineRecord::empty(quarantine_id);
        let events = record
            .handle(&QuarantineCommand::OpenQuarantine(OpenQuarantine {
                tenant_id,
                quarantine_id,
                material_id: test_material_id(),
                document_id: test_document_id(),
                line_no: 1,
                physical_count,
                requires_certificate,
                unit_cost: Some(600),
                certificate_ref: certificate_ref.map(str::to_string),
                occurred_at: test_time(),
            }))
            .unwrap();
        record.apply(&events[0]);
        record
    }

    fn decide_cmd(record: &QuarantineRecord, kind: DecisionKind) -> Decide {
        Decide {
            tenant_id: record.tenant_id().unwrap(),
            quarantine_id: record.id_typed(),
            kind,
            aisle: None,
            shelf: None,
            level: None,
            remarks: None,
            certificate_ref: None,
            general_area: GENERAL_AREA.to_string(),
            occurred_at: test_time(),
        }
    }

    #[test]
    fn open_emits_quarantine_opened_event() {
        let quarantine_id = test_quarantine_id();
        let record = QuarantineRecord::empty(quarantine_id);
        let tenant_id = test_tenant_id();
        let material_id = test_material_id();

        let events = record
            .handle(&QuarantineCommand::OpenQuarantine(OpenQuarantine {
                tenant_id,
                quarantine_id,
                material_id,
                document_id: test_document_id(),
                line_no: 1,
                physical_count: 50,
                requires_certificate: false,
                unit_cost: Some(600),
                certificate_ref: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            QuarantineEvent::QuarantineOpened(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.material_id, material_id);
                assert_eq!(e.physical_count, 50);
            }
            _ => panic!("Expected QuarantineOpened event"),
        }
    }

    #[test]
    fn open_rejects_non_positive_count() {
        let quarantine_id = test_quarantine_id();
        let record = QuarantineRecord::empty(quarantine_id);

        let err = record
            .handle(&QuarantineCommand::OpenQuarantine(OpenQuarantine {
                tenant_id: test_tenant_id(),
                quarantine_id,
                material_id: test_material_id(),
                document_id: test_document_id(),
                line_no: 1,
                physical_count: 0,
                requires_certificate: false,
                unit_cost: None,
                certificate_ref: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn good_decision_with_full_location_composes_label() {
        let mut record = opened_record(test_tenant_id(), 50, false, None);
        let mut cmd = decide_cmd(&record, DecisionKind::Good);
        cmd.aisle = Some("2".to_string());
        cmd.shelf = Some("B".to_string());
        cmd.level = Some("1".to_string());

        let events = record.handle(&QuarantineCommand::Decide(cmd)).unwrap();
        match &events[0] {
            QuarantineEvent::QuarantineReleased(e) => {
                assert_eq!(e.grade, ReleaseGrade::Good);
                assert_eq!(e.location_label, "AISLE 2 | SHELF B | LEVEL 1");
                assert_eq!(e.physical_count, 50);
                assert_eq!(e.unit_cost, Some(600));
            }
            _ => panic!("Expected QuarantineReleased event"),
        }
        record.apply(&events[0]);
        assert_eq!(record.status(), QuarantineStatus::ReleasedGood);
        assert_eq!(record.location_label(), Some("AISLE 2 | SHELF B | LEVEL 1"));
    }

    #[test]
    fn good_decision_without_location_falls_back_to_general_area() {
        let mut record = opened_record(test_tenant_id(), 50, false, None);
        let cmd = decide_cmd(&record, DecisionKind::Good);

        let events = record.handle(&QuarantineCommand::Decide(cmd)).unwrap();
        match &events[0] {
            QuarantineEvent::QuarantineReleased(e) => {
                assert_eq!(e.location_label, GENERAL_AREA);
            }
            _ => panic!("Expected QuarantineReleased event"),
        }
        record.apply(&events[0]);
        assert_eq!(record.status(), QuarantineStatus::ReleasedGood);
    }

    #[test]
    fn partial_location_is_rejected() {
        let record = opened_record(test_tenant_id(), 50, false, None);
        let mut cmd = decide_cmd(&record, DecisionKind::Good);
        cmd.aisle = Some("2".to_string());

        let err = record
            .handle(&QuarantineCommand::Decide(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::IncompleteLocation);
        assert!(record.is_pending());
    }

    #[test]
    fn blank_location_fields_count_as_absent() {
        let record = opened_record(test_tenant_id(), 50, false, None);
        let mut cmd = decide_cmd(&record, DecisionKind::Good);
        cmd.aisle = Some("  ".to_string());
        cmd.shelf = Some(String::new());

        let events = record.handle(&QuarantineCommand::Decide(cmd)).unwrap();
        match &events[0] {
            QuarantineEvent::QuarantineReleased(e) => {
                assert_eq!(e.location_label, GENERAL_AREA);
            }
            _ => panic!("Expected QuarantineReleased event"),
        }
    }

    #[test]
    fn details_decision_requires_remarks() {
        let record = opened_record(test_tenant_id(), 50, false, None);
        let cmd = decide_cmd(&record, DecisionKind::Details);

        let err = record
            .handle(&QuarantineCommand::Decide(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::MissingRemarks);
    }

    #[test]
    fn details_decision_with_remarks_releases_with_observations() {
        let mut record = opened_record(test_tenant_id(), 50, false, None);
        let mut cmd = decide_cmd(&record, DecisionKind::Details);
        cmd.remarks = Some("humidity stains on 3 sacks".to_string());

        let events = record.handle(&QuarantineCommand::Decide(cmd)).unwrap();
        match &events[0] {
            QuarantineEvent::QuarantineReleased(e) => {
                assert_eq!(e.grade, ReleaseGrade::WithObservations);
                assert_eq!(e.remarks.as_deref(), Some("humidity stains on 3 sacks"));
            }
            _ => panic!("Expected QuarantineReleased event"),
        }
        record.apply(&events[0]);
        assert_eq!(record.status(), QuarantineStatus::ReleasedWithObservations);
    }

    #[test]
    fn rejected_decision_requires_remarks() {
        let record = opened_record(test_tenant_id(), 50, false, None);
        let cmd = decide_cmd(&record, DecisionKind::Rejected);

        let err = record
            .handle(&QuarantineCommand::Decide(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::MissingRemarks);
    }

    #[test]
    fn rejected_decision_ignores_storage_and_certificate_fields() {
        let mut record = opened_record(test_tenant_id(), 50, true, None);
        let mut cmd = decide_cmd(&record, DecisionKind::Rejected);
        cmd.remarks = Some("wrong grade delivered".to_string());
        // Partial location would fail a release; rejection must not care.
        cmd.aisle = Some("2".to_string());

        let events = record.handle(&QuarantineCommand::Decide(cmd)).unwrap();
        match &events[0] {
            QuarantineEvent::QuarantineReturned(e) => {
                assert_eq!(e.physical_count, 50);
                assert_eq!(e.remarks, "wrong grade delivered");
            }
            _ => panic!("Expected QuarantineReturned event"),
        }
        record.apply(&events[0]);
        assert_eq!(record.status(), QuarantineStatus::Returned);
    }

    #[test]
    fn missing_certificate_blocks_release() {
        let record = opened_record(test_tenant_id(), 50, true, None);
        let cmd = decide_cmd(&record, DecisionKind::Good);

        let err = record
            .handle(&QuarantineCommand::Decide(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::MissingCertificate);
        assert!(record.is_pending());
    }

    #[test]
    fn decision_certificate_satisfies_requirement() {
        let record = opened_record(test_tenant_id(), 50, true, None);
        let mut cmd = decide_cmd(&record, DecisionKind::Good);
        cmd.certificate_ref = Some("docs/cert-778.pdf".to_string());

        let events = record.handle(&QuarantineCommand::Decide(cmd)).unwrap();
        match &events[0] {
            QuarantineEvent::QuarantineReleased(e) => {
                assert_eq!(e.certificate_ref.as_deref(), Some("docs/cert-778.pdf"));
            }
            _ => panic!("Expected QuarantineReleased event"),
        }
    }

    #[test]
    fn intake_certificate_satisfies_requirement() {
        let record = opened_record(test_tenant_id(), 50, true, Some("docs/cert-101.pdf"));
        let cmd = decide_cmd(&record, DecisionKind::Good);

        let events = record.handle(&QuarantineCommand::Decide(cmd)).unwrap();
        match &events[0] {
            QuarantineEvent::QuarantineReleased(e) => {
                assert_eq!(e.certificate_ref.as_deref(), Some("docs/cert-101.pdf"));
            }
            _ => panic!("Expected QuarantineReleased event"),
        }
    }

    #[test]
    fn second_decision_fails_already_resolved() {
        let mut record = opened_record(test_tenant_id(), 50, false, None);
        let cmd = decide_cmd(&record, DecisionKind::Good);

        let events = record
            .handle(&QuarantineCommand::Decide(cmd.clone()))
            .unwrap();
        record.apply(&events[0]);
        let version_after_decision = record.version();

        let err = record
            .handle(&QuarantineCommand::Decide(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyResolved);
        assert_eq!(record.version(), version_after_decision);
    }

    #[test]
    fn decide_on_unknown_record_is_not_found() {
        let record = QuarantineRecord::empty(test_quarantine_id());
        let cmd = Decide {
            tenant_id: test_tenant_id(),
            quarantine_id: record.id_typed(),
            kind: DecisionKind::Good,
            aisle: None,
            shelf: None,
            level: None,
            remarks: None,
            certificate_ref: None,
            general_area: GENERAL_AREA.to_string(),
            occurred_at: test_time(),
        };

        let err = record
            .handle(&QuarantineCommand::Decide(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let record = opened_record(test_tenant_id(), 50, false, None);
        let snapshot = record.clone();
        let cmd = decide_cmd(&record, DecisionKind::Details);

        let _ = record.handle(&QuarantineCommand::Decide(cmd));
        assert_eq!(record, snapshot);
    }

    fn decision_kind_strategy() -> impl Strategy<Value = DecisionKind> {
        prop_oneof![
            Just(DecisionKind::Good),
            Just(DecisionKind::Details),
            Just(DecisionKind::Rejected),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn record_admits_at_most_one_transition(
            kinds in proptest::collection::vec(decision_kind_strategy(), 2..6),
        ) {
            let mut record = opened_record(test_tenant_id(), 50, false, None);

            let mut first = decide_cmd(&record, kinds[0]);
            first.remarks = Some("inspected".to_string());
            let events = record
                .handle(&QuarantineCommand::Decide(first))
                .unwrap();
            record.apply(&events[0]);
            let terminal_status = record.status();
            prop_assert!(terminal_status != QuarantineStatus::Pending);

            for kind in &kinds[1..] {
                let mut again = decide_cmd(&record, *kind);
                again.remarks = Some("second look".to_string());
                let err = record
                    .handle(&QuarantineCommand::Decide(again))
                    .unwrap_err();
                prop_assert_eq!(err, DomainError::AlreadyResolved);
                prop_assert_eq!(record.status(), terminal_status);
                prop_assert_eq!(record.version(), 2);
            }
        }
    }
}
