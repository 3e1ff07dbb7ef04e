// ============================================================================
// Composite Service
// ============================================================================
//
// The caller-facing aggregate: one organization plus its members, read from
// two backends concurrently and written as events to both.
//
// ============================================================================

mod aggregator;
mod context;
mod routes;

#[cfg(test)]
pub(crate) mod fakes;

pub use aggregator::Aggregator;
pub use context::CallerContext;
pub use routes::configure_composite;
