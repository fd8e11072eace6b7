use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acopio_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use acopio_events::Event;

/// Provider identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub AggregateId);

impl ProviderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Match key for case-insensitive name resolution.
///
/// "  Acme, C.A. " and "ACME, C.A." must resolve to the same provider.
pub fn name_match_key(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Match key for tax ids.
///
/// Tax ids come off invoices with inconsistent casing and stray whitespace
/// ("j-12345678-9 "); dashes are part of the id and are kept.
pub fn tax_id_match_key(tax_id: &str) -> String {
    tax_id
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Contact information for a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: Provider (materials vendor).
///
/// Providers are matched-or-created by the identity resolver and never
/// deleted; there is no suspension lifecycle in the intake pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    id: ProviderId,
    tenant_id: Option<TenantId>,
    name: String,
    tax_id: String,
    contact: ContactInfo,
    version: u64,
    created: bool,
}

impl Provider {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProviderId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            tax_id: String::new(),
            contact: ContactInfo::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProviderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tax_id(&self) -> &str {
        &self.tax_id
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }
}

impl AggregateRoot for Provider {
    type Id = ProviderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProvider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProvider {
    pub tenant_id: TenantId,
    pub provider_id: ProviderId,
    pub name: String,
    pub tax_id: String,
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProviderContact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProviderContact {
    pub tenant_id: TenantId,
    pub provider_id: ProviderId,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderCommand {
    RegisterProvider(RegisterProvider),
    UpdateProviderContact(UpdateProviderContact),
}

/// Event: ProviderRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRegistered {
    pub tenant_id: TenantId,
    pub provider_id: ProviderId,
    pub name: String,
    pub tax_id: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProviderContactUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderContactUpdated {
    pub tenant_id: TenantId,
    pub provider_id: ProviderId,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEvent {
    ProviderRegistered(ProviderRegistered),
    ProviderContactUpdated(ProviderContactUpdated),
}

impl Event for ProviderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProviderEvent::ProviderRegistered(_) => "providers.provider.registered",
            ProviderEvent::ProviderContactUpdated(_) => "providers.provider.contact_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProviderEvent::ProviderRegistered(e) => e.occurred_at,
            ProviderEvent::ProviderContactUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Provider {
    type Command = ProviderCommand;
    type Event = ProviderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProviderEvent::ProviderRegistered(e) => {
                self.id = e.provider_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.tax_id = e.tax_id.clone();
                self.contact = e.contact.clone();
                self.created = true;
            }
            ProviderEvent::ProviderContactUpdated(e) => {
                self.contact = e.contact.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProviderCommand::RegisterProvider(cmd) => self.handle_register(cmd),
            ProviderCommand::UpdateProviderContact(cmd) => self.handle_update_contact(cmd),
        }
    }
}

impl Provider {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_provider_id(&self, provider_id: ProviderId) -> Result<(), DomainError> {
        if self.id != provider_id {
            return Err(DomainError::invariant("provider_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProvider) -> Result<Vec<ProviderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("provider already exists"));
        }

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("provider name cannot be empty"));
        }
        if cmd.tax_id.trim().is_empty() {
            return Err(DomainError::validation("provider tax id cannot be empty"));
        }

        let contact = cmd.contact.clone().unwrap_or_default();

        Ok(vec![ProviderEvent::ProviderRegistered(ProviderRegistered {
            tenant_id: cmd.tenant_id,
            provider_id: cmd.provider_id,
            name: cmd.name.trim().to_string(),
            tax_id: tax_id_match_key(&cmd.tax_id),
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_contact(
        &self,
        cmd: &UpdateProviderContact,
    ) -> Result<Vec<ProviderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_provider_id(cmd.provider_id)?;

        Ok(vec![ProviderEvent::ProviderContactUpdated(
            ProviderContactUpdated {
                tenant_id: cmd.tenant_id,
                provider_id: cmd.provider_id,
                contact: cmd.contact.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acopio_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_provider_id() -> ProviderId {
        ProviderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(tenant_id: TenantId, provider_id: ProviderId) -> RegisterProvider {
        RegisterProvider {
            tenant_id,
            provider_id,
            name: "ACME, C.A.".to_string(),
            tax_id: "J-12345678-9".to_string(),
            contact: None,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn register_provider_emits_provider_registered_event() {
        let provider = Provider::empty(test_provider_id());
        let tenant_id = test_tenant_id();
        let provider_id = test_provider_id();
        let cmd = register_cmd(tenant_id, provider_id);

        let events = provider
            .handle(&ProviderCommand::RegisterProvider(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ProviderEvent::ProviderRegistered(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.provider_id, provider_id);
                assert_eq!(e.name, "ACME, C.A.");
                assert_eq!(e.tax_id, "J-12345678-9");
            }
            _ => panic!("Expected ProviderRegistered event"),
        }
    }

    #[test]
    fn register_provider_normalizes_tax_id() {
        let provider = Provider::empty(test_provider_id());
        let mut cmd = register_cmd(test_tenant_id(), test_provider_id());
        cmd.tax_id = "  j-12345678-9 ".to_string();

        let events = provider
            .handle(&ProviderCommand::RegisterProvider(cmd))
            .unwrap();

        match &events[0] {
            ProviderEvent::ProviderRegistered(e) => {
                assert_eq!(e.tax_id, "J-12345678-9");
            }
            _ => panic!("Expected ProviderRegistered event"),
        }
    }

    #[test]
    fn register_provider_rejects_empty_name() {
        let provider = Provider::empty(test_provider_id());
        let mut cmd = register_cmd(test_tenant_id(), test_provider_id());
        cmd.name = "   ".to_string();

        let err = provider
            .handle(&ProviderCommand::RegisterProvider(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn register_provider_rejects_empty_tax_id() {
        let provider = Provider::empty(test_provider_id());
        let mut cmd = register_cmd(test_tenant_id(), test_provider_id());
        cmd.tax_id = "".to_string();

        let err = provider
            .handle(&ProviderCommand::RegisterProvider(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty tax id"),
        }
    }

    #[test]
    fn register_provider_rejects_duplicate_creation() {
        let mut provider = Provider::empty(test_provider_id());
        let cmd = register_cmd(test_tenant_id(), test_provider_id());

        let events = provider
            .handle(&ProviderCommand::RegisterProvider(cmd.clone()))
            .unwrap();
        provider.apply(&events[0]);

        let err = provider
            .handle(&ProviderCommand::RegisterProvider(cmd))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate creation"),
        }
    }

    #[test]
    fn update_contact_replaces_contact_info() {
        let mut provider = Provider::empty(test_provider_id());
        let tenant_id = test_tenant_id();
        let provider_id = test_provider_id();

        let events = provider
            .handle(&ProviderCommand::RegisterProvider(register_cmd(
                tenant_id,
                provider_id,
            )))
            .unwrap();
        provider.apply(&events[0]);

        let contact = ContactInfo {
            email: Some("ventas@acme.example".to_string()),
            phone: Some("+58-212-5551234".to_string()),
            address: None,
        };
        let cmd = UpdateProviderContact {
            tenant_id,
            provider_id,
            contact: contact.clone(),
            occurred_at: test_time(),
        };

        let events = provider
            .handle(&ProviderCommand::UpdateProviderContact(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ProviderEvent::ProviderContactUpdated(e) => {
                assert_eq!(e.contact, contact);
            }
            _ => panic!("Expected ProviderContactUpdated event"),
        }
    }

    #[test]
    fn update_contact_rejects_non_existent_provider() {
        let provider = Provider::empty(test_provider_id());
        let cmd = UpdateProviderContact {
            tenant_id: test_tenant_id(),
            provider_id: test_provider_id(),
            contact: ContactInfo::default(),
            occurred_at: test_time(),
        };

        let err = provider
            .handle(&ProviderCommand::UpdateProviderContact(cmd))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound error for non-existent provider"),
        }
    }

    #[test]
    fn version_increments_on_apply() {
        let mut provider = Provider::empty(test_provider_id());
        assert_eq!(provider.version(), 0);

        let tenant_id = test_tenant_id();
        let provider_id = test_provider_id();
        let events = provider
            .handle(&ProviderCommand::RegisterProvider(register_cmd(
                tenant_id,
                provider_id,
            )))
            .unwrap();
        provider.apply(&events[0]);
        assert_eq!(provider.version(), 1);

        let cmd = UpdateProviderContact {
            tenant_id,
            provider_id,
            contact: ContactInfo::default(),
            occurred_at: test_time(),
        };
        let events = provider
            .handle(&ProviderCommand::UpdateProviderContact(cmd))
            .unwrap();
        provider.apply(&events[0]);
        assert_eq!(provider.version(), 2);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let mut provider = Provider::empty(test_provider_id());
        let tenant_id = test_tenant_id();
        let provider_id = test_provider_id();

        let events = provider
            .handle(&ProviderCommand::RegisterProvider(register_cmd(
                tenant_id,
                provider_id,
            )))
            .unwrap();
        provider.apply(&events[0]);
        let version_before = provider.version();

        let cmd = UpdateProviderContact {
            tenant_id,
            provider_id,
            contact: ContactInfo::default(),
            occurred_at: test_time(),
        };
        let events1 = provider
            .handle(&ProviderCommand::UpdateProviderContact(cmd.clone()))
            .unwrap();
        let events2 = provider
            .handle(&ProviderCommand::UpdateProviderContact(cmd))
            .unwrap();

        assert_eq!(provider.version(), version_before);
        assert_eq!(events1, events2);
    }

    #[test]
    fn name_match_key_is_case_and_whitespace_insensitive() {
        assert_eq!(name_match_key("  Acme, C.A. "), name_match_key("ACME, C.A."));
        assert_ne!(name_match_key("ACME, C.A."), name_match_key("ACME DOS, C.A."));
    }

    #[test]
    fn tax_id_match_key_strips_inner_whitespace_and_uppercases() {
        assert_eq!(tax_id_match_key(" j-12345678-9 "), "J-12345678-9");
        assert_eq!(tax_id_match_key("J - 12345678 - 9"), "J-12345678-9");
    }
}
