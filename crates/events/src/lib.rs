//! `acopio-events` — event mechanics shared by every pipeline module.
//!
//! Domain events themselves live next to their aggregates; this crate only
//! carries the transport-agnostic pieces: the [`Event`] contract, the
//! stream [`EventEnvelope`] and the pub/sub [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;

pub use bus::{EventBus, InMemoryBusError, InMemoryEventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
