use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acopio_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use acopio_events::Event;

use crate::material::MaterialId;

/// Mapping book identifier. One book per tenant; the services keep the
/// singleton id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingBookId(pub AggregateId);

impl MappingBookId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MappingBookId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Lookup key for invoice raw text (case-insensitive).
pub fn raw_text_key(raw_text: &str) -> String {
    raw_text.trim().to_uppercase()
}

/// How a mapping entered the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    /// Learned during resolution (material auto-created for unseen text).
    Learned,
    /// Explicit reviewer override.
    Override,
}

/// Aggregate root: MappingBook.
///
/// The per-tenant registry of learned invoice-text -> material mappings.
/// Reads are last-write-wins; the event stream keeps every superseded
/// mapping, which is the audit trail for overrides.
///
/// There is no explicit create command: an empty book is a valid state and
/// the first recorded mapping binds the tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingBook {
    id: MappingBookId,
    tenant_id: Option<TenantId>,
    entries: HashMap<String, MaterialId>,
    version: u64,
}

impl MappingBook {
    pub fn empty(id: MappingBookId) -> Self {
        Self {
            id,
            tenant_id: None,
            entries: HashMap::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> MappingBookId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Resolve raw invoice text to a material, if the book knows it.
    pub fn resolve(&self, raw_text: &str) -> Option<MaterialId> {
        self.entries.get(&raw_text_key(raw_text)).copied()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl AggregateRoot for MappingBook {
    type Id = MappingBookId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordMapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMapping {
    pub tenant_id: TenantId,
    pub book_id: MappingBookId,
    pub raw_text: String,
    pub material_id: MaterialId,
    pub source: MappingSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingBookCommand {
    RecordMapping(RecordMapping),
}

/// Event: MappingRecorded.
///
/// `previous` carries the superseded material for override audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecorded {
    pub tenant_id: TenantId,
    pub book_id: MappingBookId,
    pub raw_text: String,
    pub key: String,
    pub material_id: MaterialId,
    pub previous: Option<MaterialId>,
    pub source: MappingSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingBookEvent {
    MappingRecorded(MappingRecorded),
}

impl Event for MappingBookEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MappingBookEvent::MappingRecorded(_) => "materials.mapping_book.mapping_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MappingBookEvent::MappingRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MappingBook {
    type Command = MappingBookCommand;
    type Event = MappingBookEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MappingBookEvent::MappingRecorded(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.entries.insert(e.key.clone(), e.material_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MappingBookCommand::RecordMapping(cmd) => self.handle_record(cmd),
        }
    }
}

impl MappingBook {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(DomainError::invariant("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn ensure_book_id(&self, book_id: MappingBookId) -> Result<(), DomainError> {
        if self.id != book_id {
            return Err(DomainError::invariant("book_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordMapping) -> Result<Vec<MappingBookEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_book_id(cmd.book_id)?;

        if cmd.raw_text.trim().is_empty() {
            return Err(DomainError::validation("raw text cannot be empty"));
        }

        let key = raw_text_key(&cmd.raw_text);
        let previous = self.entries.get(&key).copied();

        // Re-recording the same association is a no-op, not a new fact.
        if previous == Some(cmd.material_id) {
            return Ok(vec![]);
        }

        Ok(vec![MappingBookEvent::MappingRecorded(MappingRecorded {
            tenant_id: cmd.tenant_id,
            book_id: cmd.book_id,
            raw_text: cmd.raw_text.trim().to_string(),
            key,
            material_id: cmd.material_id,
            previous,
            source: cmd.source,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acopio_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_book_id() -> MappingBookId {
        MappingBookId::new(AggregateId::new())
    }

    fn test_material_id() -> MaterialId {
        MaterialId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn record_cmd(
        tenant_id: TenantId,
        book_id: MappingBookId,
        raw_text: &str,
        material_id: MaterialId,
        source: MappingSource,
    ) -> MappingBookCommand {
        MappingBookCommand::RecordMapping(RecordMapping {
            tenant_id,
            book_id,
            raw_text: raw_text.to_string(),
            material_id,
            source,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn record_mapping_learns_new_association() {
        let tenant_id = test_tenant_id();
        let book_id = test_book_id();
        let material_id = test_material_id();
        let mut book = MappingBook::empty(book_id);

        let events = book
            .handle(&record_cmd(
                tenant_id,
                book_id,
                "CEMENTO GRIS TIPO I",
                material_id,
                MappingSource::Learned,
            ))
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MappingBookEvent::MappingRecorded(e) => {
                assert_eq!(e.material_id, material_id);
                assert_eq!(e.previous, None);
                assert_eq!(e.source, MappingSource::Learned);
            }
        }
        book.apply(&events[0]);

        assert_eq!(book.resolve("cemento gris tipo i"), Some(material_id));
        assert_eq!(book.entry_count(), 1);
    }

    #[test]
    fn re_recording_same_association_is_a_no_op() {
        let tenant_id = test_tenant_id();
        let book_id = test_book_id();
        let material_id = test_material_id();
        let mut book = MappingBook::empty(book_id);

        let events = book
            .handle(&record_cmd(
                tenant_id,
                book_id,
                "CEMENTO GRIS TIPO I",
                material_id,
                MappingSource::Learned,
            ))
            .unwrap();
        book.apply(&events[0]);
        let version_before = book.version();

        let events = book
            .handle(&record_cmd(
                tenant_id,
                book_id,
                "  cemento gris tipo i ",
                material_id,
                MappingSource::Learned,
            ))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(book.version(), version_before);
    }

    #[test]
    fn override_replaces_mapping_and_records_previous() {
        let tenant_id = test_tenant_id();
        let book_id = test_book_id();
        let first = test_material_id();
        let second = test_material_id();
        let mut book = MappingBook::empty(book_id);

        let events = book
            .handle(&record_cmd(
                tenant_id,
                book_id,
                "CEMENTO GRIS",
                first,
                MappingSource::Learned,
            ))
            .unwrap();
        book.apply(&events[0]);

        let events = book
            .handle(&record_cmd(
                tenant_id,
                book_id,
                "CEMENTO GRIS",
                second,
                MappingSource::Override,
            ))
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MappingBookEvent::MappingRecorded(e) => {
                assert_eq!(e.previous, Some(first));
                assert_eq!(e.source, MappingSource::Override);
            }
        }
        book.apply(&events[0]);

        assert_eq!(book.resolve("CEMENTO GRIS"), Some(second));
        assert_eq!(book.entry_count(), 1);
    }

    #[test]
    fn record_mapping_rejects_empty_raw_text() {
        let book = MappingBook::empty(test_book_id());
        let err = book
            .handle(&record_cmd(
                test_tenant_id(),
                book.id_typed(),
                "   ",
                test_material_id(),
                MappingSource::Learned,
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn record_mapping_rejects_foreign_tenant() {
        let tenant_id = test_tenant_id();
        let book_id = test_book_id();
        let mut book = MappingBook::empty(book_id);

        let events = book
            .handle(&record_cmd(
                tenant_id,
                book_id,
                "ARENA LAVADA",
                test_material_id(),
                MappingSource::Learned,
            ))
            .unwrap();
        book.apply(&events[0]);

        let err = book
            .handle(&record_cmd(
                test_tenant_id(),
                book_id,
                "PIEDRA PICADA",
                test_material_id(),
                MappingSource::Learned,
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn version_increments_on_apply() {
        let tenant_id = test_tenant_id();
        let book_id = test_book_id();
        let mut book = MappingBook::empty(book_id);
        assert_eq!(book.version(), 0);

        let events = book
            .handle(&record_cmd(
                tenant_id,
                book_id,
                "ARENA LAVADA",
                test_material_id(),
                MappingSource::Learned,
            ))
            .unwrap();
        book.apply(&events[0]);
        assert_eq!(book.version(), 1);
    }
}
