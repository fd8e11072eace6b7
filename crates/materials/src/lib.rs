//! Materials domain module (catalog + stock ledger, event-sourced).
//!
//! A material is both a catalog entry and the serialization point for its
//! stock: every signed movement is an event on the material's stream, so the
//! available balance is the fold of the movement history and concurrent
//! postings are serialized by the stream's optimistic concurrency check.
//!
//! The mapping book learns invoice raw text -> material associations so the
//! next intake of the same OCR text resolves without human help.

pub mod mapping;
pub mod material;

pub use mapping::{
    MappingBook, MappingBookCommand, MappingBookEvent, MappingBookId, MappingRecorded,
    MappingSource, RecordMapping, raw_text_key,
};
pub use material::{
    CreateMaterial, IntakeStaged, Material, MaterialCommand, MaterialCreated, MaterialEvent,
    MaterialId, MovementKind, MovementPosted, PostMovement, StageIntake, material_name_key,
};
