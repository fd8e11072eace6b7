//! Shared tracing/logging setup for the pipeline binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

/// Initialize process-wide observability.
///
/// Safe to call multiple times; subsequent calls become no-ops, so tests
/// and the API binary can both call it unconditionally.
pub fn init() {
    tracing::init();
}
