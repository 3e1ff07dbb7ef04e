// ============================================================================
// Events Module
// ============================================================================
//
// The message-bus contract between the composite service and the backends.
// Only the envelope lives here; the channels that carry it are in
// `messaging`, the consumers that apply it are in `backend`.
//
// ============================================================================

mod event;

pub use event::{decode_event, Event, EventKind};
