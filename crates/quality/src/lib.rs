//! Quality domain module (event-sourced).
//!
//! Received goods sit in quarantine until an inspector decides their fate.
//! This crate holds the quarantine record state machine and its conformance
//! rules (mandatory remarks, storage location completeness, certificate
//! blockers). Posting the resulting stock movement is the quality service's
//! job, driven by the events emitted here.

pub mod quarantine;

pub use quarantine::{
    Decide, DecisionKind, OpenQuarantine, QuarantineCommand, QuarantineEvent, QuarantineId,
    QuarantineOpened, QuarantineRecord, QuarantineReleased, QuarantineReturned, QuarantineStatus,
    ReleaseGrade,
};
