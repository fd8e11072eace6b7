//! `acopio-extraction` — ports for the two opaque intake collaborators.
//!
//! Scanned invoices are persisted through [`DocumentStore`] and parsed by an
//! [`InvoiceExtractor`]. Both are external services from the pipeline's point
//! of view; extractor output is untrusted input and flows through the same
//! validation path as manual entry. This crate carries the port traits, the
//! extracted-invoice model and the in-memory implementations used by tests
//! and the default runtime wiring.

pub mod model;
pub mod ports;

pub use model::{ExtractedInvoice, ExtractedLine};
pub use ports::{
    DocumentStore, ExtractionError, InMemoryDocumentStore, InvoiceExtractor, ScriptedExtractor,
};
