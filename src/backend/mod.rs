// ============================================================================
// Backend Services
// ============================================================================
//
// The two services the composite view is assembled from. Each one owns a
// store, serves synchronous reads over HTTP and applies create/delete events
// through an actor so that events are applied one at a time, in arrival
// order.
//
// Structure:
// - store     - in-memory key-value stores with the uniqueness rules
// - service   - create/read/delete logic, chaos parameters for reads
// - processor - EventProcessor actor consuming event envelopes
// - routes    - actix-web handlers
//
// ============================================================================

mod processor;
mod routes;
mod service;
mod store;

pub use processor::{EventProcessor, EventSink, ProcessEvent};
pub use routes::{configure_member, configure_organization};
pub use service::{ChaosParams, MemberService, OrganizationService};
