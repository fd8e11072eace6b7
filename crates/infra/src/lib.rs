//! Infrastructure layer: event persistence, dispatch, read models and the
//! application services that orchestrate the intake pipeline.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod settings;

#[cfg(test)]
mod integration_tests;
