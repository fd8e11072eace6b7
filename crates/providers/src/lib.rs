//! Providers domain module (construction-materials vendors, event-sourced).
//!
//! Providers are identity-resolved at intake: matched by tax id or
//! normalized name, created on miss, never deleted. This crate contains the
//! pure domain logic only (no IO, no HTTP, no storage).

pub mod provider;

pub use provider::{
    ContactInfo, Provider, ProviderCommand, ProviderContactUpdated, ProviderEvent, ProviderId,
    ProviderRegistered, RegisterProvider, UpdateProviderContact, name_match_key,
    tax_id_match_key,
};
