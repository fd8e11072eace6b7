//! Procurement domain module (event-sourced).
//!
//! This crate contains business rules for purchase documents received from
//! providers (header validation, line conformance, monetary totals),
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). Duplicate gating and identity resolution happen in the intake
//! service that drives this aggregate.

pub mod document;

pub use document::{
    DocumentId, DocumentLine, DocumentRegistered, LineQualityStatus, PurchaseDocument,
    PurchaseDocumentCommand, PurchaseDocumentEvent, RegisterDocument, invoice_number_key,
};
